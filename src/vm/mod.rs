//! EvoVM - Virtual CPU for self-replicating programs
//!
//! An organism's genome is a sequence of single-byte instructions executed
//! by a stack machine with four heads per thread. Nop instructions double
//! as modifiers and as labels, so programs address memory spaces, threads
//! and jump targets by the nop runs that follow an instruction.
//!
//! ## Per-thread state
//!
//! ```text
//! Heads   IP · Read · Write · Flow      (space index, position)
//! Stacks  AX · BX · CX · DX             (depth 10, circular)
//! Labels  read label · next label       (nop modifiers, max 10)
//! ```
//!
//! ## Memory
//!
//! ```text
//! space 0      running genome
//! space 1..n   allocated by label (Mem-Set, Call, parasites)
//! ```
//!
//! ## Example
//!
//! ```text
//! Mem-Set Nop-A          ; flow head -> start of space "A"
//! Head-Move Nop-C        ; write head -> flow head
//! Search                 ; flow head -> after the Search
//! Inst-Read              ; loop: copy one instruction
//! Inst-Write
//! Divide                 ;   offspring once the copy is complete
//! Head-Move Nop-A        ;   IP -> flow head
//! ```

mod hardware;
mod head;
mod inst_lib;
mod instruction;
mod label;
mod memory;
mod organism;
mod random;
mod stack;
mod thread;

pub use hardware::{Context, EngineState, Hardware, Parasite, SearchDirection, StepResult};
pub use head::{Head, HeadKind};
pub use inst_lib::{InstInfo, InstLib, Opcode, NUM_NOPS};
pub use instruction::{Genome, Instruction, MAX_SYMBOLS};
pub use label::{Label, MAX_LABEL_SIZE};
pub use memory::{MemoryArray, MemorySpace, SiteFlags};
pub use organism::{
    FaultKind, FaultLocation, FaultRecord, InjectRecord, Organism, Phenotype, RecordingOrganism,
};
pub use random::RandomStream;
pub use stack::{CpuStack, StackBank, NUM_STACKS, STACK_AX, STACK_BX, STACK_CX, STACK_DX, STACK_DEPTH};
pub use thread::{Thread, ThreadOwner, ThreadTable};

/// Longest label naming a memory space (Mem-Set, Call, Inject)
pub const MAX_MEMSPACE_LABEL: usize = 3;

/// Longest label naming a thread (Thread-Set, Thread-Get)
pub const MAX_THREAD_LABEL: usize = 3;
