//! Register map for the target architecture's memory segments.

/// Stack pointer register.
pub const SP: u16 = 0;
/// Base pointer of the `local` segment.
pub const LCL: u16 = 1;
/// Base pointer of the `argument` segment.
pub const ARG: u16 = 2;
/// Base pointer of the `this` segment; also cell 0 of `pointer`.
pub const THIS: u16 = 3;
/// Base pointer of the `that` segment; also cell 1 of `pointer`.
pub const THAT: u16 = 4;

/// The `temp` segment occupies registers 5 through 12 directly.
pub const TEMP_BASE: u16 = 5;

/// Lowest RAM address the operand stack may use.
pub const STACK_BASE: u16 = 256;
