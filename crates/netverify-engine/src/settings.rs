use serde::{Deserialize, Serialize};

/// Switches for the encoding-size reductions computed by
/// [`crate::optimizations::Optimizations`]. Turning one off makes the
/// encoder model the corresponding state everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationSettings {
    /// Drop protocols, attributes and routes that cannot affect the
    /// destinations being queried.
    pub enable_slicing: bool,
    /// Share one export record across all neighbors of a protocol.
    pub enable_export_merge: bool,
    /// Reuse the peer's export record as the import record.
    pub enable_import_export_merge: bool,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            enable_slicing: true,
            enable_export_merge: true,
            enable_import_export_merge: true,
        }
    }
}

impl OptimizationSettings {
    /// Everything off: the model keeps every attribute and record.
    pub fn disabled() -> Self {
        Self {
            enable_slicing: false,
            enable_export_merge: false,
            enable_import_export_merge: false,
        }
    }
}

/// Options for building and solving one encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub optimizations: OptimizationSettings,
    /// Solver timeout; 0 disables the limit.
    pub timeout_secs: u64,
    /// Write the SMT-LIB2 script of every query to this path before solving.
    pub dump_smt: Option<String>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            optimizations: OptimizationSettings::default(),
            timeout_secs: 300,
            dump_smt: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings: EncoderSettings =
            serde_json::from_str(r#"{ "optimizations": { "enable_slicing": false } }"#)
                .expect("settings");
        assert!(!settings.optimizations.enable_slicing);
        assert!(settings.optimizations.enable_export_merge);
        assert_eq!(settings.timeout_secs, 300);
        assert_eq!(settings.dump_smt, None);
    }
}
