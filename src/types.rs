// src/types.rs

use bitflags::bitflags;

/// Handle of the endpoint a triggered operation is posted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EndpointId(pub u64);

/// Fabric address of a peer, as resolved by an address vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct FabricAddr(pub u64);

impl FabricAddr {
    /// No specific peer (wildcard receive source).
    pub const UNSPEC: Self = Self(u64::MAX);
}

/// Local memory registration descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MemDesc(pub u64);

/// User context handed back in the operation's completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Context(pub u64);

/// Local buffer, described by address and length.
///
/// The counter never dereferences it; it is handed verbatim to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoBuf {
    pub addr: usize,
    pub len: usize,
}

impl IoBuf {
    pub fn new(addr: usize, len: usize) -> Self {
        Self { addr, len }
    }

    /// Describe a byte slice. The caller keeps it alive until the operation completes.
    pub fn from_slice(buf: &[u8]) -> Self {
        Self {
            addr: buf.as_ptr() as usize,
            len: buf.len(),
        }
    }
}

/// Remote memory target of an RMA or atomic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteIov {
    pub addr: u64,
    pub key: u64,
}

/// Element type of an atomic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Datatype {
    I8 = 0,
    U8 = 1,
    I16 = 2,
    U16 = 3,
    I32 = 4,
    U32 = 5,
    I64 = 6,
    U64 = 7,
    F32 = 8,
    F64 = 9,
}

/// Atomic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AtomicOp {
    Min = 0,
    Max = 1,
    Sum = 2,
    Prod = 3,
    Lor = 4,
    Land = 5,
    Bor = 6,
    Band = 7,
    Lxor = 8,
    Bxor = 9,
    Read = 10,
    Write = 11,
    Cswap = 12,
    CswapNe = 13,
    CswapLe = 14,
    CswapLt = 15,
    CswapGe = 16,
    CswapGt = 17,
    Mswap = 18,
}

bitflags! {
    /// Per-operation flags, also stored on a counter as its default op flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpFlags: u64 {
        const MORE = 1 << 10;
        const MULTI_RECV = 1 << 16;
        const REMOTE_CQ_DATA = 1 << 17;
        const COMPLETION = 1 << 24;
        const INJECT_COMPLETE = 1 << 25;
        const TRANSMIT_COMPLETE = 1 << 27;
        const DELIVERY_COMPLETE = 1 << 28;
        const TRIGGER = 1 << 29;
        const FENCE = 1 << 31;
        const INJECT = 1 << 59;
    }
}
