use crate::error::CatalogError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("../assets/builtin_presets.json");

pub type BaseVals = BTreeMap<String, f64>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetDefinition {
    pub name: String,
    #[serde(rename = "baseVals", default, deserialize_with = "lenient_base_vals")]
    pub base_vals: BaseVals,
    #[serde(default)]
    pub init_eqs_str: Option<String>,
    #[serde(default)]
    pub frame_eqs_str: Option<String>,
    #[serde(default)]
    pub pixel_eqs_str: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub shapes: Vec<ShapeSpec>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub waves: Vec<WaveSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeSpec {
    #[serde(rename = "baseVals", default, deserialize_with = "lenient_base_vals")]
    pub base_vals: BaseVals,
    #[serde(default)]
    pub init_eqs_str: Option<String>,
    #[serde(default)]
    pub frame_eqs_str: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveSpec {
    #[serde(rename = "baseVals", default, deserialize_with = "lenient_base_vals")]
    pub base_vals: BaseVals,
    #[serde(default)]
    pub init_eqs_str: Option<String>,
    #[serde(default)]
    pub frame_eqs_str: Option<String>,
    #[serde(default)]
    pub point_eqs_str: Option<String>,
}

impl ShapeSpec {
    pub fn enabled(&self) -> bool {
        base_flag(&self.base_vals, "enabled")
    }
}

impl WaveSpec {
    pub fn enabled(&self) -> bool {
        base_flag(&self.base_vals, "enabled")
    }
}

fn base_flag(vals: &BaseVals, key: &str) -> bool {
    vals.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .is_some_and(|(_, v)| *v != 0.0)
}

// Catalogs in the wild carry the odd string or null among numeric fields.
fn lenient_base_vals<'de, D>(d: D) -> Result<BaseVals, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(d)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| {
            let n = match v {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
                serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            n.is_finite().then(|| (k.to_ascii_lowercase(), n))
        })
        .collect())
}

fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetCatalog {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub count: usize,
    pub presets: Vec<PresetDefinition>,
}

impl PresetCatalog {
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let catalog: PresetCatalog = serde_json::from_str(json)?;
        if catalog.presets.is_empty() {
            return Err(CatalogError::Empty);
        }
        if catalog.count != 0 && catalog.count != catalog.presets.len() {
            tracing::warn!(
                declared = catalog.count,
                actual = catalog.presets.len(),
                "preset catalog count does not match its contents"
            );
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = read(path)?;
        let catalog = Self::from_json_str(&json)?;
        tracing::info!(path = %path.display(), presets = catalog.len(), "loaded preset catalog");
        Ok(catalog)
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    /// The catalog at `path` (or the bundled one), narrowed by an optional
    /// curated-name list.
    pub fn open(path: Option<&Path>, curated: Option<&Path>) -> Result<Self, CatalogError> {
        let mut catalog = match path {
            Some(p) => Self::load(p)?,
            None => Self::builtin()?,
        };
        if let Some(c) = curated {
            let names = load_curated(c)?;
            catalog.apply_curated(&names)?;
        }
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PresetDefinition> {
        self.presets.get(index)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|p| p.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.presets
            .iter()
            .position(|p| p.name == name)
            .or_else(|| {
                let want = name.to_lowercase();
                self.presets.iter().position(|p| p.name.to_lowercase() == want)
            })
    }

    /// Keeps only the named presets, in the order given. Unknown names are skipped.
    pub fn apply_curated(&mut self, names: &[String]) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        let mut picked = Vec::with_capacity(names.len());
        for name in names {
            match self.position(name) {
                Some(i) if seen.insert(i) => picked.push(i),
                Some(_) => {}
                None => tracing::debug!(%name, "curated preset not in catalog"),
            }
        }
        if picked.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut slots = std::mem::take(&mut self.presets)
            .into_iter()
            .map(Some)
            .collect::<Vec<_>>();
        self.presets = picked
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();
        self.count = self.presets.len();
        Ok(())
    }
}

pub fn load_curated(path: &Path) -> Result<Vec<String>, CatalogError> {
    let json = read(path)?;
    Ok(serde_json::from_str(&json)?)
}

fn read(path: &Path) -> Result<String, CatalogError> {
    std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })
}
