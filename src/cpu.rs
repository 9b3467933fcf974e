/// Architectural position of the simulated program as seen by the cache driver.
#[derive(Debug, Default)]
pub struct Cpu {
    /// Fetch address of the instruction being executed.
    pub pc: u64,
    /// Instructions executed so far.
    pub instr_idx: u64,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu { pc: 0, instr_idx: 0 }
    }
}
