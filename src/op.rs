// src/op.rs

//! Deferred operation payloads and the executor that runs them.
//!
//! Each payload carries exactly what the immediate form of the operation
//! takes. A counter stores them inside triggers and hands them, unchanged,
//! to an [`OpExecutor`] once the trigger's threshold is reached.

use crate::error::{Error, Result};
use crate::types::{
    AtomicOp, Context, Datatype, EndpointId, FabricAddr, IoBuf, MemDesc, OpFlags, RemoteIov,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SendOp {
    pub ep: EndpointId,
    pub buf: IoBuf,
    pub desc: Option<MemDesc>,
    pub dest_addr: FabricAddr,
    pub context: Context,
    pub flags: OpFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecvOp {
    pub ep: EndpointId,
    pub buf: IoBuf,
    pub desc: Option<MemDesc>,
    pub src_addr: FabricAddr,
    pub context: Context,
    pub flags: OpFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedSendOp {
    pub ep: EndpointId,
    pub buf: IoBuf,
    pub desc: Option<MemDesc>,
    pub dest_addr: FabricAddr,
    pub tag: u64,
    pub context: Context,
    pub flags: OpFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaggedRecvOp {
    pub ep: EndpointId,
    pub buf: IoBuf,
    pub desc: Option<MemDesc>,
    pub src_addr: FabricAddr,
    pub tag: u64,
    /// Tag bits ignored when matching.
    pub ignore: u64,
    pub context: Context,
    pub flags: OpFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub ep: EndpointId,
    pub buf: IoBuf,
    pub desc: Option<MemDesc>,
    pub dest_addr: FabricAddr,
    pub remote: RemoteIov,
    pub context: Context,
    pub flags: OpFlags,
    /// Remote completion data, delivered with `REMOTE_CQ_DATA`.
    pub data: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadOp {
    pub ep: EndpointId,
    pub buf: IoBuf,
    pub desc: Option<MemDesc>,
    pub src_addr: FabricAddr,
    pub remote: RemoteIov,
    pub context: Context,
    pub flags: OpFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtomicWriteOp {
    pub ep: EndpointId,
    pub buf: IoBuf,
    pub count: usize,
    pub desc: Option<MemDesc>,
    pub dest_addr: FabricAddr,
    pub remote: RemoteIov,
    pub datatype: Datatype,
    pub op: AtomicOp,
    pub context: Context,
    pub flags: OpFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtomicReadWriteOp {
    pub ep: EndpointId,
    pub buf: IoBuf,
    pub count: usize,
    pub desc: Option<MemDesc>,
    pub result: IoBuf,
    pub result_desc: Option<MemDesc>,
    pub dest_addr: FabricAddr,
    pub remote: RemoteIov,
    pub datatype: Datatype,
    pub op: AtomicOp,
    pub context: Context,
    pub flags: OpFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtomicCompareWriteOp {
    pub ep: EndpointId,
    pub buf: IoBuf,
    pub count: usize,
    pub desc: Option<MemDesc>,
    pub compare: IoBuf,
    pub compare_desc: Option<MemDesc>,
    pub result: IoBuf,
    pub result_desc: Option<MemDesc>,
    pub dest_addr: FabricAddr,
    pub remote: RemoteIov,
    pub datatype: Datatype,
    pub op: AtomicOp,
    pub context: Context,
    pub flags: OpFlags,
}

/// An operation deferred until a counter threshold.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggeredOp {
    Send(SendOp),
    Recv(RecvOp),
    TaggedSend(TaggedSendOp),
    TaggedRecv(TaggedRecvOp),
    Write(WriteOp),
    Read(ReadOp),
    AtomicWrite(AtomicWriteOp),
    AtomicReadWrite(AtomicReadWriteOp),
    AtomicCompareWrite(AtomicCompareWriteOp),
}

impl TriggeredOp {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send(_) => "send",
            Self::Recv(_) => "recv",
            Self::TaggedSend(_) => "tsend",
            Self::TaggedRecv(_) => "trecv",
            Self::Write(_) => "write",
            Self::Read(_) => "read",
            Self::AtomicWrite(_) => "atomic_write",
            Self::AtomicReadWrite(_) => "atomic_readwrite",
            Self::AtomicCompareWrite(_) => "atomic_compwrite",
        }
    }

    pub fn endpoint(&self) -> EndpointId {
        match self {
            Self::Send(op) => op.ep,
            Self::Recv(op) => op.ep,
            Self::TaggedSend(op) => op.ep,
            Self::TaggedRecv(op) => op.ep,
            Self::Write(op) => op.ep,
            Self::Read(op) => op.ep,
            Self::AtomicWrite(op) => op.ep,
            Self::AtomicReadWrite(op) => op.ep,
            Self::AtomicCompareWrite(op) => op.ep,
        }
    }

    /// Run the operation on `exec`, routing on the variant.
    pub fn execute<E: OpExecutor + ?Sized>(&self, exec: &E) -> Result<()> {
        match self {
            Self::Send(op) => exec.send(op),
            Self::Recv(op) => exec.recv(op),
            Self::TaggedSend(op) => exec.tagged_send(op),
            Self::TaggedRecv(op) => exec.tagged_recv(op),
            Self::Write(op) => exec.write(op),
            Self::Read(op) => exec.read(op),
            Self::AtomicWrite(op) => exec.atomic_write(op),
            Self::AtomicReadWrite(op) => exec.atomic_readwrite(op),
            Self::AtomicCompareWrite(op) => exec.atomic_compwrite(op),
        }
    }
}

/// The messaging, RMA and atomic entry points a triggered operation lands on.
///
/// Every method defaults to [`Error::NoSystemCall`], so an executor only
/// implements the kinds it supports. A counter logs and drops triggers whose
/// kind is not supported.
pub trait OpExecutor: Send + Sync {
    fn send(&self, op: &SendOp) -> Result<()> {
        let _ = op;
        Err(Error::NoSystemCall)
    }

    fn recv(&self, op: &RecvOp) -> Result<()> {
        let _ = op;
        Err(Error::NoSystemCall)
    }

    fn tagged_send(&self, op: &TaggedSendOp) -> Result<()> {
        let _ = op;
        Err(Error::NoSystemCall)
    }

    fn tagged_recv(&self, op: &TaggedRecvOp) -> Result<()> {
        let _ = op;
        Err(Error::NoSystemCall)
    }

    fn write(&self, op: &WriteOp) -> Result<()> {
        let _ = op;
        Err(Error::NoSystemCall)
    }

    fn read(&self, op: &ReadOp) -> Result<()> {
        let _ = op;
        Err(Error::NoSystemCall)
    }

    fn atomic_write(&self, op: &AtomicWriteOp) -> Result<()> {
        let _ = op;
        Err(Error::NoSystemCall)
    }

    fn atomic_readwrite(&self, op: &AtomicReadWriteOp) -> Result<()> {
        let _ = op;
        Err(Error::NoSystemCall)
    }

    fn atomic_compwrite(&self, op: &AtomicCompareWriteOp) -> Result<()> {
        let _ = op;
        Err(Error::NoSystemCall)
    }
}
