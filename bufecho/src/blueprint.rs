use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{fs, io};

use serde::{Deserialize, Serialize};

use crate::{BufEchoError, Guest, DEFAULT_ENTRY, DEFAULT_FUEL_PER_CALL};

/// Base type of a configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub guests: BTreeMap<String, GuestBp>,

    /// Directory relative guest paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuestBp {
    // The WASM module file, binary or text format
    pub wasm: PathBuf,

    /// Export to call, of type `() -> i32`
    #[serde(default = "default_entry")]
    pub entry: String,

    /// Amount of fuel to provide per call
    #[serde(default = "default_fuel_per_call")]
    pub fuel_per_call: u64,

    /// How often to call the entry
    #[serde(default = "default_calls")]
    pub calls: usize,
}

fn default_entry() -> String {
    DEFAULT_ENTRY.into()
}

fn default_fuel_per_call() -> u64 {
    DEFAULT_FUEL_PER_CALL
}

fn default_calls() -> usize {
    1
}

/// A loaded guest together with how to run it
pub struct GuestRun {
    pub guest: Guest,
    pub entry: String,
    pub calls: usize,
}

impl Blueprint {
    pub fn new<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let mut bp = Self::from_toml(&fs::read_to_string(path)?)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        bp.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        trace!("parsed blueprint:\n{bp:#?}");
        Ok(bp)
    }

    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load, link and validate every guest
    ///
    /// Guests failing to load are skipped, unless `strict` is set, in which case the first failure
    /// is returned.
    pub fn load_guests(&self, strict: bool) -> Result<Vec<GuestRun>, BufEchoError> {
        debug!("loading guests");
        let mut runs = Vec::with_capacity(self.guests.len());
        for (name, bp_guest) in &self.guests {
            let path = self.base_dir.join(&bp_guest.wasm);
            let loaded = Guest::load(name, &path).and_then(|guest| {
                guest.validate(&bp_guest.entry)?;
                Ok(guest)
            });

            let mut guest = match loaded {
                Ok(guest) => guest,
                Err(e) if strict => return Err(e),
                Err(e) => {
                    warn!("error during initialization of {name:?}, skipping: {e}");
                    continue;
                }
            };
            guest.fuel_per_call = bp_guest.fuel_per_call;

            runs.push(GuestRun {
                guest,
                entry: bp_guest.entry.clone(),
                calls: bp_guest.calls,
            });
        }

        debug!("done loading {} guests", runs.len());
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let bp = Blueprint::from_toml(
            r#"
            [guests.echo]
            wasm = "echo.wasm"
            "#,
        )
        .unwrap();

        let echo = &bp.guests["echo"];
        assert_eq!(echo.wasm, PathBuf::from("echo.wasm"));
        assert_eq!(echo.entry, "run");
        assert_eq!(echo.fuel_per_call, 100_000);
        assert_eq!(echo.calls, 1);
    }

    #[test]
    fn explicit_values() {
        let bp = Blueprint::from_toml(
            r#"
            [guests.a]
            wasm = "a.wat"
            entry = "main"
            fuel_per_call = 15000
            calls = 3
            "#,
        )
        .unwrap();

        let a = &bp.guests["a"];
        assert_eq!(a.entry, "main");
        assert_eq!(a.fuel_per_call, 15_000);
        assert_eq!(a.calls, 3);
    }

    #[test]
    fn empty_blueprint_has_no_guests() {
        let bp = Blueprint::from_toml("").unwrap();
        assert!(bp.guests.is_empty());
        assert!(bp.load_guests(true).unwrap().is_empty());
    }

    #[test]
    fn missing_wasm_is_an_error() {
        assert!(Blueprint::from_toml("[guests.a]\nentry = \"run\"").is_err());
    }

    #[test]
    fn unloadable_guest() {
        let bp = Blueprint::from_toml("[guests.gone]\nwasm = \"/does/not/exist.wasm\"").unwrap();

        assert_eq!(
            bp.load_guests(true).err(),
            Some(BufEchoError::WasmLoadError)
        );
        assert!(bp.load_guests(false).unwrap().is_empty());
    }
}
