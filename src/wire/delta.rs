use crate::error::WireError;
use crate::wire::header::{
    FLAGS_COUNT_MASK, HEADER_LEN, MAX_DELTAS_PER_PACKET, MsgType, PacketHeader, be_u16, be_u32,
};
use bytemuck::{Pod, Zeroable};

pub const DELTA_LEN: usize = 16;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bid = 0,
    Ask = 1,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Set = 0,
    Add = 1,
    Update = 2,
    Remove = 3,
}

impl Action {
    /// Add and Update both move quantity and count towards OFI.
    #[inline(always)]
    pub fn is_additive(self) -> bool {
        matches!(self, Action::Add | Action::Update)
    }
}

/// A delta record exactly as carried on the wire (16 bytes, big-endian).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaRecord {
    pub price_ticks: i32,
    pub qty: i32,
    pub level: u16,
    pub side: u8,
    pub action: u8,
    pub reserved: u32,
}

impl DeltaRecord {
    pub fn new(side: Side, action: Action, level: u16, price_ticks: i32, qty: i32) -> Self {
        Self {
            price_ticks,
            qty,
            level,
            side: side as u8,
            action: action as u8,
            reserved: 0,
        }
    }

    /// `buf` must hold at least 16 bytes.
    #[inline(always)]
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            price_ticks: be_u32(buf, 0) as i32,
            qty: be_u32(buf, 4) as i32,
            level: be_u16(buf, 8),
            side: buf[10],
            action: buf[11],
            reserved: be_u32(buf, 12),
        }
    }

    pub fn encode(&self) -> [u8; DELTA_LEN] {
        let mut out = [0u8; DELTA_LEN];
        out[0..4].copy_from_slice(&self.price_ticks.to_be_bytes());
        out[4..8].copy_from_slice(&self.qty.to_be_bytes());
        out[8..10].copy_from_slice(&self.level.to_be_bytes());
        out[10] = self.side;
        out[11] = self.action;
        out[12..16].copy_from_slice(&self.reserved.to_be_bytes());
        out
    }
}

/// Decoded delta handed to the book engine.
///
/// `side` keeps only bit 0 of the wire byte and `action` only bits [1:0], so every
/// decoded event carries a valid side and action.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DeltaEvent {
    pub t_send_ns: u64,
    pub price_ticks: i32,
    pub qty: i32,
    pub level: u16,
    pub side: u8,
    pub action: u8,
    pub is_last_in_batch: u8,
    pub _pad: [u8; 3],
}

impl DeltaEvent {
    pub fn new(side: Side, action: Action, level: u16, price_ticks: i32, qty: i32) -> Self {
        Self {
            price_ticks,
            qty,
            level,
            side: side as u8,
            action: action as u8,
            ..Default::default()
        }
    }

    #[inline(always)]
    pub fn from_record(record: &DeltaRecord, t_send_ns: u64, is_last: bool) -> Self {
        Self {
            t_send_ns,
            price_ticks: record.price_ticks,
            qty: record.qty,
            level: record.level,
            side: record.side & 0x1,
            action: record.action & 0x3,
            is_last_in_batch: is_last as u8,
            _pad: [0; 3],
        }
    }

    #[inline(always)]
    pub fn side(&self) -> Side {
        if self.side & 0x1 == 0 { Side::Bid } else { Side::Ask }
    }

    #[inline(always)]
    pub fn action(&self) -> Action {
        match self.action & 0x3 {
            0 => Action::Set,
            1 => Action::Add,
            2 => Action::Update,
            _ => Action::Remove,
        }
    }

    #[inline(always)]
    pub fn is_last(&self) -> bool {
        self.is_last_in_batch != 0
    }
}

/// One fully decoded packet. Plain-old-data so it can be appended to a journal.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DeltaBatch {
    pub header: PacketHeader,
    pub events: [DeltaEvent; MAX_DELTAS_PER_PACKET],
    /// Records materialized in `events`.
    pub count: u32,
    /// Count claimed by the sender's flags, before clamping.
    pub declared_count: u32,
}

impl DeltaBatch {
    pub fn empty(header: PacketHeader) -> Self {
        Self {
            header,
            count: 0,
            declared_count: header.declared_delta_count() as u32,
            ..<Self as Zeroable>::zeroed()
        }
    }

    #[inline(always)]
    pub fn events(&self) -> &[DeltaEvent] {
        &self.events[..self.count as usize]
    }

    pub fn is_ping(&self) -> bool {
        self.header.msg_type == MsgType::Ping as u8
    }
}

/// Decodes a PING or DELTAS packet.
///
/// `buf` must hold every declared record, but only the first `min(declared, 128)`
/// are materialized; the rest are consumed and discarded. Nothing is returned
/// unless the whole batch decoded.
pub fn decode_packet(buf: &[u8]) -> Result<DeltaBatch, WireError> {
    let header = PacketHeader::decode(buf)?;
    if !header.has_valid_magic() {
        return Err(WireError::BadMagic(header.magic));
    }

    match header.kind()? {
        MsgType::Ping => Ok(DeltaBatch::empty(header)),
        MsgType::Deltas => {
            let needed = HEADER_LEN + header.declared_delta_count() * DELTA_LEN;
            if buf.len() < needed {
                return Err(WireError::MalformedPacket {
                    needed,
                    available: buf.len(),
                });
            }

            let count = header.delta_count();
            let kept = HEADER_LEN + count * DELTA_LEN;
            let mut batch = DeltaBatch::empty(header);
            for (i, chunk) in buf[HEADER_LEN..kept].chunks_exact(DELTA_LEN).enumerate() {
                let record = DeltaRecord::decode(chunk);
                batch.events[i] = DeltaEvent::from_record(&record, header.t_send_ns, i + 1 == count);
            }
            batch.count = count as u32;
            Ok(batch)
        }
        other => Err(WireError::UnsupportedMessage(other as u8)),
    }
}

/// Builds a DELTAS frame. The header's count bits are taken from `records.len()`.
pub fn encode_deltas_packet(header: &PacketHeader, records: &[DeltaRecord], out: &mut Vec<u8>) {
    let count = records.len().min(FLAGS_COUNT_MASK as usize) as u16;
    let header = PacketHeader {
        msg_type: MsgType::Deltas as u8,
        flags: (header.flags & !FLAGS_COUNT_MASK) | count,
        ..*header
    };
    out.extend_from_slice(&header.encode());
    for record in records {
        out.extend_from_slice(&record.encode());
    }
}
