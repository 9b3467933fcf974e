use bitflags::bitflags;

bitflags! {
    /// Operation-class metadata the decoder attaches to every executed instruction.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct OpFlags: u8 {
        /// References data memory.
        const MEM = 1 << 0;
        const LOAD = 1 << 1;
        const STORE = 1 << 2;
    }
}

impl OpFlags {
    pub fn is_load(self) -> bool {
        self.contains(OpFlags::MEM | OpFlags::LOAD)
    }

    pub fn is_store(self) -> bool {
        self.contains(OpFlags::MEM | OpFlags::STORE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_store_need_mem() {
        assert!(!OpFlags::LOAD.is_load());
        assert!((OpFlags::MEM | OpFlags::LOAD).is_load());
        assert!(!(OpFlags::MEM | OpFlags::LOAD).is_store());

        let rmw = OpFlags::MEM | OpFlags::LOAD | OpFlags::STORE;
        assert!(rmw.is_load() && rmw.is_store());
    }

    #[test]
    fn unknown_bits_are_dropped() {
        assert_eq!(OpFlags::from_bits_truncate(0xff), OpFlags::all());
    }
}
