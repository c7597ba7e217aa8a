use bitflags::bitflags;

bitflags! {
    /// Access and property flags shared by classes, methods, and inner-class table entries.
    ///
    /// Bits that have different meanings per location (`ACC_SUPER` versus `ACC_SYNCHRONIZED`)
    /// are kept under one name; unknown bits are retained.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

impl AccessFlags {
    /// Build from the raw `u16` stored in a class file.
    pub fn from_raw(bits: u16) -> Self {
        Self::from_bits_retain(bits)
    }

    pub fn has(self, flag: AccessFlags) -> bool {
        self.contains(flag)
    }
}
