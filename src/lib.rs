//! # EvoVM - Virtual CPU for Digital Evolution
//!
//! Populations of self-replicating programs run on this CPU, copy
//! themselves instruction by instruction, mutate while doing so, and hand
//! finished offspring to whatever population surrounds them.
//!
//! ## Core Components
//!
//! - **Hardware**: the per-organism CPU (threads, heads, stacks, memory spaces)
//! - **InstLib**: the closed instruction set with per-instruction cost and weight
//! - **Organism**: the collaborator trait the CPU reports births, faults,
//!   IO and parasites to
//! - **RandomStream**: the single seeded stream every stochastic decision draws from
//!
//! ## Example
//!
//! ```ignore
//! use evovm::{loader, Context, Hardware, HardwareConfig, InstLib, RandomStream, RecordingOrganism};
//! use std::sync::Arc;
//!
//! let lib = Arc::new(InstLib::standard());
//! let genome = loader::load_genome("ancestor.org", &lib)?;
//! let mut org = RecordingOrganism::new(genome);
//! let mut hw = Hardware::from_organism(lib, Arc::new(HardwareConfig::default()), &org);
//! let mut rng = RandomStream::new(7);
//!
//! while org.offspring.is_empty() {
//!     hw.single_process(&mut Context::new(&mut rng, &mut org));
//! }
//! ```

// Virtual CPU
pub mod vm;
pub use vm::{
    // Engine
    Context, EngineState, Hardware, Parasite, SearchDirection, StepResult,
    // Instructions
    Genome, InstLib, Instruction, Opcode,
    // Collaborators
    FaultKind, FaultLocation, Organism, Phenotype, RandomStream, RecordingOrganism,
};

// Configuration
pub mod config;
pub use config::{
    DivideMethod, HardwareConfig, InjectMethod, InstOverride, InstSetConfig, MutationRates,
    ThreadSlicing, MAX_GENOME_LENGTH, MIN_GENOME_LENGTH,
};

// Error types
mod error;
pub use error::{EvoError, Result};

// Genome and config files
pub mod loader;
pub use loader::{load_config, load_genome, load_inst_set, parse_genome, save_genome};
