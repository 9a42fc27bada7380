//! Hardware configuration - read-only settings consumed by the virtual CPU
//!
//! All fields have defaults, so a config file only needs to name what it
//! changes:
//!
//! ```text
//! {
//!   "max_cpu_threads": 4,
//!   "divide_method": "birth",
//!   "mutations": { "copy_mut_prob": 0.01 }
//! }
//! ```

use crate::error::{EvoError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shortest genome an offspring may have, whatever the size range allows
pub const MIN_GENOME_LENGTH: usize = 8;
/// Longest genome an offspring may have, whatever the size range allows
pub const MAX_GENOME_LENGTH: usize = 2048;

/// How many threads advance per engine call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadSlicing {
    /// One instruction from one thread per call
    #[default]
    Single,
    /// One instruction from every live thread per call
    All,
}

/// What happens to the parent after a successful divide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivideMethod {
    /// Parent keeps running untouched
    Offspring,
    /// Parent is fully reset (fresh thread, memory spaces, parasites)
    #[default]
    Split,
    /// Only the calling thread is reset (or killed if others remain)
    Birth,
}

/// What happens to the injecting thread after a parasite is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectMethod {
    /// Thread keeps its heads and stacks
    #[default]
    Offspring,
    /// Thread heads and stacks are reset
    Split,
}

/// Mutation probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationRates {
    /// Per Inst-Read probability of reading a random instruction
    pub copy_mut_prob: f64,
    /// Per-site substitution probability at divide
    pub div_mut_prob: f64,
    /// Per-site insertion probability at divide
    pub div_ins_prob: f64,
    /// Per-site deletion probability at divide
    pub div_del_prob: f64,
    /// Per-site substitution probability applied to the parent at divide
    pub parent_mut_prob: f64,
    /// Per-site substitution probability at inject
    pub inject_mut_prob: f64,
    /// Per-site insertion probability at inject
    pub inject_ins_prob: f64,
    /// Per-site deletion probability at inject
    pub inject_del_prob: f64,
    /// Per-execution probability of running a random instruction instead
    pub exec_err_prob: f64,
}

impl Default for MutationRates {
    fn default() -> Self {
        Self {
            copy_mut_prob: 0.0075,
            div_mut_prob: 0.0,
            div_ins_prob: 0.05,
            div_del_prob: 0.05,
            parent_mut_prob: 0.0,
            inject_mut_prob: 0.0,
            inject_ins_prob: 0.0,
            inject_del_prob: 0.0,
            exec_err_prob: 0.0,
        }
    }
}

impl MutationRates {
    /// All rates zero (deterministic replication)
    pub fn none() -> Self {
        Self {
            copy_mut_prob: 0.0,
            div_mut_prob: 0.0,
            div_ins_prob: 0.0,
            div_del_prob: 0.0,
            parent_mut_prob: 0.0,
            inject_mut_prob: 0.0,
            inject_ins_prob: 0.0,
            inject_del_prob: 0.0,
            exec_err_prob: 0.0,
        }
    }

    fn fields_mut(&mut self) -> [(&'static str, &mut f64); 9] {
        [
            ("copy_mut_prob", &mut self.copy_mut_prob),
            ("div_mut_prob", &mut self.div_mut_prob),
            ("div_ins_prob", &mut self.div_ins_prob),
            ("div_del_prob", &mut self.div_del_prob),
            ("parent_mut_prob", &mut self.parent_mut_prob),
            ("inject_mut_prob", &mut self.inject_mut_prob),
            ("inject_ins_prob", &mut self.inject_ins_prob),
            ("inject_del_prob", &mut self.inject_del_prob),
            ("exec_err_prob", &mut self.exec_err_prob),
        ]
    }
}

/// Virtual CPU settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub max_cpu_threads: usize,
    pub thread_slicing: ThreadSlicing,
    pub divide_method: DivideMethod,
    pub inject_method: InjectMethod,
    /// Installing a parasite makes the host skip its next primary-thread cycle
    pub inject_is_virulent: bool,
    /// Probability of scheduling the parasite thread instead of the host
    pub parasite_virulence: Option<f64>,
    /// Namespace parasite memory-space labels away from host labels
    pub parasite_mem_spaces: bool,
    /// Parasite threads copy without copy mutations
    pub parasite_no_copy_mut: bool,
    /// Nops of a read label that get marked executed
    pub max_label_exe_size: usize,
    /// Offspring size must lie within [parent / range, parent * range]
    pub offspring_size_range: f64,
    /// Absolute minimum offspring size (0 = off)
    pub min_genome_size: usize,
    /// Absolute maximum offspring size (0 = off)
    pub max_genome_size: usize,
    /// Fraction of the offspring that must have been copied
    pub min_copied_lines: f64,
    /// Fraction of the parent that must have been executed
    pub min_exe_lines: f64,
    /// Smallest code block Inject will send
    pub min_inject_size: usize,
    /// A failed divide fully resets the organism
    pub divide_failure_resets: bool,
    /// Lifetime instruction budget (0 = unlimited)
    pub max_executed: u64,
    pub mutations: MutationRates,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            max_cpu_threads: 1,
            thread_slicing: ThreadSlicing::Single,
            divide_method: DivideMethod::Split,
            inject_method: InjectMethod::Offspring,
            inject_is_virulent: false,
            parasite_virulence: None,
            parasite_mem_spaces: false,
            parasite_no_copy_mut: false,
            max_label_exe_size: 1,
            offspring_size_range: 2.0,
            min_genome_size: 0,
            max_genome_size: 0,
            min_copied_lines: 0.5,
            min_exe_lines: 0.5,
            min_inject_size: 8,
            divide_failure_resets: false,
            max_executed: 0,
            mutations: MutationRates::default(),
        }
    }
}

impl HardwareConfig {
    /// Clamp out-of-range probabilities and reject unusable settings
    pub fn validate(mut self) -> Result<Self> {
        if !(self.offspring_size_range >= 1.0) {
            return Err(EvoError::Config(format!(
                "offspring_size_range must be >= 1.0, got {}",
                self.offspring_size_range
            )));
        }
        if self.max_cpu_threads == 0 {
            log::warn!("max_cpu_threads = 0 leaves no thread to run; using 1");
            self.max_cpu_threads = 1;
        }
        if self.max_genome_size != 0 && self.max_genome_size < self.min_genome_size {
            return Err(EvoError::Config(format!(
                "max_genome_size {} is below min_genome_size {}",
                self.max_genome_size, self.min_genome_size
            )));
        }

        for (name, value) in self.mutations.fields_mut() {
            *value = clamp_probability(name, *value);
        }
        self.min_copied_lines = clamp_probability("min_copied_lines", self.min_copied_lines);
        self.min_exe_lines = clamp_probability("min_exe_lines", self.min_exe_lines);
        if let Some(v) = self.parasite_virulence {
            self.parasite_virulence = Some(clamp_probability("parasite_virulence", v));
        }
        Ok(self)
    }
}

fn clamp_probability(name: &str, value: f64) -> f64 {
    if value.is_nan() {
        log::warn!("{} is NaN; using 0", name);
        return 0.0;
    }
    if !(0.0..=1.0).contains(&value) {
        let clamped = value.clamp(0.0, 1.0);
        log::warn!("{} = {} out of [0, 1]; clamped to {}", name, value, clamped);
        return clamped;
    }
    value
}

/// Per-instruction override applied when building the instruction library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstOverride {
    /// Relative weight when drawing a random instruction
    pub redundancy: u32,
    /// Fetches needed before the instruction executes
    pub cost: u32,
    /// Probability the instruction fails without executing
    pub prob_fail: f64,
}

impl Default for InstOverride {
    fn default() -> Self {
        Self { redundancy: 1, cost: 1, prob_fail: 0.0 }
    }
}

/// Instruction-set overrides keyed by instruction name (`"Val-Div"`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstSetConfig {
    pub overrides: HashMap<String, InstOverride>,
}

impl InstSetConfig {
    pub fn with(mut self, name: impl Into<String>, over: InstOverride) -> Self {
        self.overrides.insert(name.into(), over);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = HardwareConfig::default();
        assert_eq!(cfg.max_cpu_threads, 1);
        assert_eq!(cfg.divide_method, DivideMethod::Split);
        assert_eq!(cfg.min_inject_size, 8);
        assert_eq!(cfg.mutations.copy_mut_prob, 0.0075);
        assert_eq!(cfg.mutations.div_ins_prob, 0.05);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "max_cpu_threads": 3, "divide_method": "birth",
                        "mutations": { "copy_mut_prob": 0.5 } }"#;
        let cfg: HardwareConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.max_cpu_threads, 3);
        assert_eq!(cfg.divide_method, DivideMethod::Birth);
        assert_eq!(cfg.mutations.copy_mut_prob, 0.5);
        assert_eq!(cfg.mutations.div_del_prob, 0.05);
        assert_eq!(cfg.offspring_size_range, 2.0);
    }

    #[test]
    fn test_validate_clamps_probabilities() {
        let mut cfg = HardwareConfig::default();
        cfg.mutations.copy_mut_prob = 1.5;
        cfg.mutations.div_mut_prob = -0.2;
        cfg.parasite_virulence = Some(3.0);
        let cfg = cfg.validate().unwrap();
        assert_eq!(cfg.mutations.copy_mut_prob, 1.0);
        assert_eq!(cfg.mutations.div_mut_prob, 0.0);
        assert_eq!(cfg.parasite_virulence, Some(1.0));
    }

    #[test]
    fn test_validate_rejects_size_range() {
        let cfg = HardwareConfig { offspring_size_range: 0.5, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(EvoError::Config(_))));
    }

    #[test]
    fn test_inst_set_config_json() {
        let json = r#"{ "Val-Div": { "cost": 3 }, "Divide": { "prob_fail": 0.1 } }"#;
        let cfg: InstSetConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.overrides["Val-Div"].cost, 3);
        assert_eq!(cfg.overrides["Val-Div"].redundancy, 1);
        assert_eq!(cfg.overrides["Divide"].prob_fail, 0.1);
    }
}
