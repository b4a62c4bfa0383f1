fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Checked against the target, not the host, so cross builds link correctly.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("macos") {
        return;
    }

    // screencapturekit's Swift bridge loads `@rpath/libswift_Concurrency.dylib`;
    // resolve it from the system runtime under /usr/lib/swift.
    println!("cargo:rustc-link-arg=-Wl,-rpath,/usr/lib/swift");
}
