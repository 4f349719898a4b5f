pub mod generator;
pub mod rules;
pub mod slots;

pub use generator::{EmptySlot, GenerationReport, GeneratorSettings, PersonaGenerator};
pub use slots::{load_slots, parse_slots, Slot, SlotRole};
