use crate::error::WireError;
use bytemuck::{Pod, Zeroable};

pub const MAGIC: [u8; 4] = *b"LOB1";
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 32;

/// DELTAS only: clear book and feature state before applying this packet.
pub const FLAG_RESET: u16 = 1 << 15;
pub const FLAGS_COUNT_MASK: u16 = 0x7FFF;

/// Records materialized per packet, whatever the flags claim.
pub const MAX_DELTAS_PER_PACKET: usize = 128;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Ping = 0,
    Deltas = 1,
    Features = 2,
    FeatScore = 3,
    FeaturesWithTiming = 4,
}

impl TryFrom<u8> for MsgType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MsgType::Ping),
            1 => Ok(MsgType::Deltas),
            2 => Ok(MsgType::Features),
            3 => Ok(MsgType::FeatScore),
            4 => Ok(MsgType::FeaturesWithTiming),
            other => Err(WireError::UnsupportedMessage(other)),
        }
    }
}

/// The 32-byte LOB1 header.
///
/// The in-memory layout is reordered (rsv2 sits next to hdr_len) so the struct has no
/// implicit padding and can travel through a journal. The wire layout is produced by
/// [`PacketHeader::encode`]:
///
/// ```text
/// Offset  Size  Field
/// 0       4     magic "LOB1"
/// 4       1     version
/// 5       1     msg_type
/// 6       2     flags
/// 8       2     hdr_len (32)
/// 10      4     seq
/// 14      8     t_send_ns
/// 22      8     t_ingress_ns
/// 30      2     rsv2
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PacketHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub msg_type: u8,
    pub flags: u16,
    pub hdr_len: u16,
    pub rsv2: u16,
    pub seq: u32,
    pub t_send_ns: u64,
    pub t_ingress_ns: u64,
}

const _: () = assert!(size_of::<PacketHeader>() == HEADER_LEN);

impl PacketHeader {
    /// Header of a DELTAS packet carrying `count` records.
    pub fn deltas(seq: u32, t_send_ns: u64, count: u16, reset: bool) -> Self {
        let mut flags = count & FLAGS_COUNT_MASK;
        if reset {
            flags |= FLAG_RESET;
        }
        Self {
            msg_type: MsgType::Deltas as u8,
            flags,
            seq,
            t_send_ns,
            ..Self::base()
        }
    }

    pub fn ping(seq: u32, t_send_ns: u64) -> Self {
        Self {
            msg_type: MsgType::Ping as u8,
            seq,
            t_send_ns,
            ..Self::base()
        }
    }

    /// Reply header: echoes flags, seq and t_send_ns of the request.
    pub fn reply(&self, msg_type: MsgType, t_ingress_ns: u64) -> Self {
        Self {
            msg_type: msg_type as u8,
            flags: self.flags,
            seq: self.seq,
            t_send_ns: self.t_send_ns,
            t_ingress_ns,
            ..Self::base()
        }
    }

    fn base() -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            msg_type: 0,
            flags: 0,
            hdr_len: HEADER_LEN as u16,
            rsv2: 0,
            seq: 0,
            t_send_ns: 0,
            t_ingress_ns: 0,
        }
    }

    /// Reads the header fields from the first 32 bytes. Magic and type are not validated here.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_LEN {
            return Err(WireError::MalformedPacket {
                needed: HEADER_LEN,
                available: buf.len(),
            });
        }
        Ok(Self {
            magic: [buf[0], buf[1], buf[2], buf[3]],
            version: buf[4],
            msg_type: buf[5],
            flags: be_u16(buf, 6),
            hdr_len: be_u16(buf, 8),
            seq: be_u32(buf, 10),
            t_send_ns: be_u64(buf, 14),
            t_ingress_ns: be_u64(buf, 22),
            rsv2: be_u16(buf, 30),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.magic);
        out[4] = self.version;
        out[5] = self.msg_type;
        out[6..8].copy_from_slice(&self.flags.to_be_bytes());
        out[8..10].copy_from_slice(&self.hdr_len.to_be_bytes());
        out[10..14].copy_from_slice(&self.seq.to_be_bytes());
        out[14..22].copy_from_slice(&self.t_send_ns.to_be_bytes());
        out[22..30].copy_from_slice(&self.t_ingress_ns.to_be_bytes());
        out[30..32].copy_from_slice(&self.rsv2.to_be_bytes());
        out
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn kind(&self) -> Result<MsgType, WireError> {
        MsgType::try_from(self.msg_type)
    }

    /// Count encoded in flags bits [14:0], before clamping.
    #[inline]
    pub fn declared_delta_count(&self) -> usize {
        (self.flags & FLAGS_COUNT_MASK) as usize
    }

    /// Count of records the decoder materializes.
    #[inline]
    pub fn delta_count(&self) -> usize {
        self.declared_delta_count().min(MAX_DELTAS_PER_PACKET)
    }

    #[inline]
    pub fn is_reset(&self) -> bool {
        self.flags & FLAG_RESET != 0
    }
}

#[inline(always)]
pub(crate) fn be_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

#[inline(always)]
pub(crate) fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline(always)]
pub(crate) fn be_u64(buf: &[u8], at: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(b)
}
