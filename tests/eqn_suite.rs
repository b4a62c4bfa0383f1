use approx::assert_abs_diff_eq;
use milkwarp::eqn::{ExecEnv, MegaBuf, SlotTable, Vm, compile};
use milkwarp::error::{CompileError, EvalError};

struct Ctx {
    table: SlotTable,
    vars: Vec<f64>,
    megabuf: MegaBuf,
    gmegabuf: MegaBuf,
    vm: Vm,
}

impl Ctx {
    fn new() -> Self {
        Self {
            table: SlotTable::new(),
            vars: Vec::new(),
            megabuf: MegaBuf::new(),
            gmegabuf: MegaBuf::new(),
            vm: Vm::new(),
        }
    }

    fn set(&mut self, name: &str, v: f64) {
        let s = self.table.reserve(name) as usize;
        self.vars.resize(self.table.len(), 0.0);
        self.vars[s] = v;
    }

    fn run(&mut self, src: &str) -> Result<f64, EvalError> {
        let prog = compile(src, &mut self.table).expect("compiles");
        self.vars.resize(self.table.len(), 0.0);
        let mut env = ExecEnv {
            vars: &mut self.vars,
            megabuf: &mut self.megabuf,
            gmegabuf: &mut self.gmegabuf,
        };
        self.vm.run(&prog, &mut env)
    }

    fn get(&self, name: &str) -> f64 {
        self.table
            .get(name)
            .map(|s| self.vars[s as usize])
            .unwrap_or(0.0)
    }
}

fn eval(src: &str) -> Ctx {
    let mut ctx = Ctx::new();
    ctx.run(src).expect("runs");
    ctx
}

// ── Arithmetic and assignment ───────────────────────────────────────────────

#[test]
fn precedence_and_power() {
    let c = eval("a = 1 + 2 * 3; b = 2 ^ 3 ^ 2; c = -2 ^ 2; d = (1 + 2) * 3;");
    assert_eq!(c.get("a"), 7.0);
    assert_eq!(c.get("b"), 512.0);
    assert_eq!(c.get("c"), -4.0);
    assert_eq!(c.get("d"), 9.0);
}

#[test]
fn compound_assignment() {
    let c = eval("x = 10; x += 5; x -= 3; x *= 2; x /= 4; y = 7; y %= 4;");
    assert_eq!(c.get("x"), 6.0);
    assert_eq!(c.get("y"), 3.0);
}

#[test]
fn division_and_modulo_by_zero_yield_zero() {
    let c = eval("a = 5 / 0; b = 5 % 0; c = div(3, 0);");
    assert_eq!(c.get("a"), 0.0);
    assert_eq!(c.get("b"), 0.0);
    assert_eq!(c.get("c"), 0.0);
}

#[test]
fn modulo_with_saturated_operands_does_not_trap() {
    let c = eval("a = -1e19 % -1; b = mod(-1e19, -1); c = 7 % -1e30; d = -7 % 3;");
    assert_eq!(c.get("a"), 0.0);
    assert_eq!(c.get("b"), 0.0);
    assert_eq!(c.get("c"), 7.0);
    assert_eq!(c.get("d"), -1.0);
}

#[test]
fn names_are_case_insensitive() {
    let c = eval("Zoom = 1.5; ZOOM += 0.5;");
    assert_eq!(c.get("zoom"), 2.0);
}

#[test]
fn unknown_variables_read_as_zero() {
    let c = eval("a = never_set + 1;");
    assert_eq!(c.get("a"), 1.0);
}

#[test]
fn comments_are_skipped() {
    let c = eval("a = 1; // a = 2;\n/* a = 3; */ b = a + 1;");
    assert_eq!(c.get("a"), 1.0);
    assert_eq!(c.get("b"), 2.0);
}

#[test]
fn constants() {
    let c = eval("a = $pi; b = $e; c = $PHI;");
    assert_abs_diff_eq!(c.get("a"), std::f64::consts::PI);
    assert_abs_diff_eq!(c.get("b"), std::f64::consts::E);
    assert_abs_diff_eq!(c.get("c"), 1.618_033_988_749_895);
}

#[test]
fn non_finite_results_keep_the_old_value() {
    let mut c = Ctx::new();
    c.set("a", 3.0);
    c.run("a = log(0);").unwrap();
    assert_eq!(c.get("a"), 3.0);
}

// ── Builtins ────────────────────────────────────────────────────────────────

#[test]
fn math_builtins() {
    let c = eval(
        "a = sqr(3); b = sqrt(-16); c = abs(-2); d = sign(-0.3); e = floor(-1.5); \
         f = int(-1.5); g = min(2, 3) + max(2, 3); h = clamp(5, 0, 1); i = fract(2.25); \
         j = atan2(1, 1); k = pow(2, 10); l = sigmoid(0, 1); m = invsqrt(4);",
    );
    assert_eq!(c.get("a"), 9.0);
    assert_eq!(c.get("b"), 4.0);
    assert_eq!(c.get("c"), 2.0);
    assert_eq!(c.get("d"), -1.0);
    assert_eq!(c.get("e"), -2.0);
    assert_eq!(c.get("f"), -1.0);
    assert_eq!(c.get("g"), 5.0);
    assert_eq!(c.get("h"), 1.0);
    assert_eq!(c.get("i"), 0.25);
    assert_abs_diff_eq!(c.get("j"), std::f64::consts::FRAC_PI_4);
    assert_eq!(c.get("k"), 1024.0);
    assert_eq!(c.get("l"), 0.5);
    assert_eq!(c.get("m"), 0.5);
}

#[test]
fn comparison_builtins() {
    let c = eval(
        "a = equal(1, 1.000001); b = above(2, 1); c = below(2, 1); d = band(1, 0); \
         e = bor(0, 2); f = bnot(0); g = 5 | 2; h = 6 & 3;",
    );
    assert_eq!(c.get("a"), 1.0);
    assert_eq!(c.get("b"), 1.0);
    assert_eq!(c.get("c"), 0.0);
    assert_eq!(c.get("d"), 0.0);
    assert_eq!(c.get("e"), 1.0);
    assert_eq!(c.get("f"), 1.0);
    assert_eq!(c.get("g"), 7.0);
    assert_eq!(c.get("h"), 2.0);
}

#[test]
fn rand_stays_in_range() {
    let mut c = Ctx::new();
    for _ in 0..200 {
        c.run("a = rand(10); b = rand(0);").unwrap();
        let a = c.get("a");
        let b = c.get("b");
        assert!((0.0..10.0).contains(&a), "a={a}");
        assert!((0.0..1.0).contains(&b), "b={b}");
    }
}

// ── Control flow ────────────────────────────────────────────────────────────

#[test]
fn if_selects_a_branch() {
    let c = eval("a = if(1, 10, 20); b = if(0, 10, 20); c = 0 ? 1 : 2;");
    assert_eq!(c.get("a"), 10.0);
    assert_eq!(c.get("b"), 20.0);
    assert_eq!(c.get("c"), 2.0);
}

#[test]
fn if_only_evaluates_the_taken_branch() {
    let c = eval("if(1, a = 1, b = 1);");
    assert_eq!(c.get("a"), 1.0);
    assert_eq!(c.get("b"), 0.0);
}

#[test]
fn logical_operators_short_circuit() {
    let c = eval("r = 0 && (a = 1); s = 1 || (b = 1); t = 2 && 3;");
    assert_eq!(c.get("r"), 0.0);
    assert_eq!(c.get("s"), 1.0);
    assert_eq!(c.get("t"), 1.0);
    assert_eq!(c.get("a"), 0.0);
    assert_eq!(c.get("b"), 0.0);
}

#[test]
fn counted_loop_and_exec() {
    let c = eval("n = 0; loop(5, n += 2); m = exec2(k = 3, k * 2);");
    assert_eq!(c.get("n"), 10.0);
    assert_eq!(c.get("m"), 6.0);
}

#[test]
fn while_loop_runs_until_false() {
    let c = eval("i = 0; while(i += 1; i < 8);");
    assert_eq!(c.get("i"), 8.0);
}

#[test]
fn block_statements() {
    let c = eval("s = 0; for (i = 0; i < 4; i += 1) { s += i; } if (s > 5) { big = 1; } else { big = 0; }");
    assert_eq!(c.get("s"), 6.0);
    assert_eq!(c.get("big"), 1.0);
}

#[test]
fn runaway_loop_aborts_and_rolls_back() {
    let mut c = Ctx::new();
    c.set("x", 7.0);
    let err = c.run("x = 1; while(1)").unwrap_err();
    assert_eq!(err, EvalError::LoopBudget);
    assert_eq!(c.get("x"), 7.0);
}

// ── Buffers ─────────────────────────────────────────────────────────────────

#[test]
fn megabuf_reads_and_writes() {
    let c = eval("megabuf(10) = 4; megabuf[11] = 5; megabuf(10) += 1; a = megabuf(10) + megabuf(11.9);");
    assert_eq!(c.get("a"), 10.0);
    assert_eq!(c.megabuf.allocated_blocks(), 1);
}

#[test]
fn megabuf_out_of_range_is_ignored() {
    let c = eval("megabuf(-1) = 3; megabuf(1e9) = 3; a = megabuf(-1) + megabuf(1e9);");
    assert_eq!(c.get("a"), 0.0);
    assert_eq!(c.megabuf.allocated_blocks(), 0);
}

#[test]
fn gmegabuf_is_separate_from_megabuf() {
    let c = eval("gmegabuf(3) = 9; a = megabuf(3); b = gmegabuf(3);");
    assert_eq!(c.get("a"), 0.0);
    assert_eq!(c.get("b"), 9.0);
    assert_eq!(c.gmegabuf.get(3.0), 9.0);
}

#[test]
fn buffer_writes_roll_back_on_abort() {
    let mut c = Ctx::new();
    let _ = c.run("megabuf(5) = 1; while(1)");
    assert_eq!(c.megabuf.get(5.0), 0.0);
}

// ── Compile errors ──────────────────────────────────────────────────────────

fn compile_err(src: &str) -> CompileError {
    compile(src, &mut SlotTable::new()).unwrap_err()
}

#[test]
fn rejects_unknown_functions() {
    assert!(matches!(compile_err("a = frobnicate(1);"), CompileError::UnknownFunction { .. }));
}

#[test]
fn rejects_wrong_arity() {
    assert!(matches!(compile_err("a = sin(1, 2);"), CompileError::Arity { .. }));
}

#[test]
fn rejects_bad_characters() {
    assert!(matches!(compile_err("a = 1 @ 2;"), CompileError::BadChar { ch: '@', .. }));
}

#[test]
fn rejects_unassignable_targets() {
    assert!(matches!(compile_err("1 = 2;"), CompileError::NotAssignable { .. }));
}

#[test]
fn rejects_unbalanced_parens() {
    assert!(matches!(compile_err("a = (1 + 2;"), CompileError::Expected { .. }));
}

#[test]
fn deep_nesting_is_an_error_not_a_crash() {
    let src = format!("a = {}1{};", "(".repeat(5_000), ")".repeat(5_000));
    assert_eq!(compile_err(&src), CompileError::TooDeep);
}

#[test]
fn empty_source_is_a_noop() {
    let prog = compile("   ", &mut SlotTable::new()).unwrap();
    assert!(prog.is_empty());
}
