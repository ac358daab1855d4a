//! UDP streaming catalogue: a `u8` opcode followed by its payload, one
//! packet per datagram.

use crate::codec::{CodecError, Decode, Encode, PacketReader, PacketWriter};

/// Stay under a typical path MTU once IP/UDP headers are added.
pub const MAX_DATAGRAM_BYTES: usize = 1200;

pub mod udp_op {
    pub const LATENCY: u8 = 0x00;
    pub const OBJECT_STREAM: u8 = 0x01;
    pub const PLAYER_SUMMARY: u8 = 0x02;
    pub const NOTIFY: u8 = 0x03;
    pub const REGION_CUE: u8 = 0x04;
    pub const OBJECT_DESTROYED: u8 = 0x05;
    pub const TELESCOPE_SIGHT: u8 = 0x06;
    pub const VESSEL_STATE: u8 = 0x07;
    pub const CARGO: u8 = 0x08;
    pub const ASTRONAUT_MOVE: u8 = 0x09;
    pub const TERRAIN_ENTITIES: u8 = 0x0A;
}

/// Object stream sequence numbers wrap to 0 after this value.
pub const STREAM_SEQ_MAX: u16 = 65534;

pub fn next_stream_seq(seq: u16) -> u16 {
    if seq >= STREAM_SEQ_MAX {
        0
    } else {
        seq + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NotifyKind {
    Generic = 0,
    Failure = 1,
    Success = 2,
}

impl NotifyKind {
    fn read(r: &mut PacketReader<'_>) -> Result<Self, CodecError> {
        match r.u8()? {
            0 => Ok(Self::Generic),
            1 => Ok(Self::Failure),
            2 => Ok(Self::Success),
            v => Err(CodecError::InvalidValue {
                field: "notify kind",
                value: v as u64,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MoveMode {
    Idle = 0,
    Target = 1,
    Input = 2,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientDatagram {
    /// Echoed back; the first one binds the sender's UDP endpoint.
    Latency { account: u64, client_time: u64 },
    AstronautMove { astronaut: u32, mode: MoveMode, x: f32, y: f32 },
}

impl Decode for ClientDatagram {
    fn decode(r: &mut PacketReader<'_>) -> Result<Self, CodecError> {
        let op = r.u8()?;
        Ok(match op {
            udp_op::LATENCY => Self::Latency {
                account: r.u64()?,
                client_time: r.u64()?,
            },
            udp_op::ASTRONAUT_MOVE => Self::AstronautMove {
                astronaut: r.u32()?,
                mode: match r.u8()? {
                    0 => MoveMode::Idle,
                    1 => MoveMode::Target,
                    2 => MoveMode::Input,
                    v => {
                        return Err(CodecError::InvalidValue {
                            field: "move mode",
                            value: v as u64,
                        })
                    }
                },
                x: r.f32()?,
                y: r.f32()?,
            },
            other => return Err(CodecError::UnknownOpcode(other as u16)),
        })
    }
}

impl Encode for ClientDatagram {
    fn encode(&self, w: &mut PacketWriter) {
        match *self {
            Self::Latency { account, client_time } => {
                w.u8(udp_op::LATENCY).u64(account).u64(client_time);
            }
            Self::AstronautMove { astronaut, mode, x, y } => {
                w.u8(udp_op::ASTRONAUT_MOVE)
                    .u32(astronaut)
                    .u8(mode as u8)
                    .f32(x)
                    .f32(y);
            }
        }
    }
}

/// One object in an OBJECT_STREAM datagram. Positions are whole units of
/// the chunk's scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamedObject {
    pub id: u64,
    pub x: i64,
    pub y: i64,
    pub vx: f32,
    pub vy: f32,
    pub rotation: f32,
}

const STREAMED_OBJECT_BYTES: usize = 8 + 8 + 8 + 4 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSummaryEntry {
    pub account: u64,
    pub temp_id: u16,
    /// 0 when the player controls no vessel.
    pub vessel: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainEntityState {
    pub id: i64,
    pub x: f32,
    pub y: f32,
    pub moving: bool,
    pub dir_deg: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerDatagram {
    Latency { account: u64, client_time: u64 },
    ObjectStream { seq: u16, objects: Vec<StreamedObject> },
    PlayerSummary { entries: Vec<PlayerSummaryEntry> },
    Notify { kind: NotifyKind, message: String },
    RegionCue { vessel: u64, region: u32 },
    ObjectDestroyed { object: u64 },
    TelescopeSight { vessel: u64, fov_deg: f32, objects: Vec<u64> },
    VesselState {
        vessel: u64,
        fuel: f32,
        power: f32,
        hull: f32,
        temperature: f32,
        stage: u8,
        flags: u8,
        landed: bool,
    },
    Cargo { vessel: u64, items: Vec<(u16, u32)> },
    TerrainEntities { planet: u64, entities: Vec<TerrainEntityState> },
}

impl ServerDatagram {
    pub fn notify(kind: NotifyKind, message: impl Into<String>) -> Self {
        Self::Notify {
            kind,
            message: message.into(),
        }
    }

    /// Splits a chunk frame into as many OBJECT_STREAM datagrams as needed to
    /// stay under [`MAX_DATAGRAM_BYTES`]. All batches share `seq`.
    pub fn object_stream_batches(seq: u16, objects: &[StreamedObject]) -> Vec<Self> {
        let per = (MAX_DATAGRAM_BYTES - 5) / STREAMED_OBJECT_BYTES;
        if objects.is_empty() {
            return vec![Self::ObjectStream {
                seq,
                objects: Vec::new(),
            }];
        }
        objects
            .chunks(per)
            .map(|batch| Self::ObjectStream {
                seq,
                objects: batch.to_vec(),
            })
            .collect()
    }
}

impl Decode for ServerDatagram {
    fn decode(r: &mut PacketReader<'_>) -> Result<Self, CodecError> {
        let op = r.u8()?;
        Ok(match op {
            udp_op::LATENCY => Self::Latency {
                account: r.u64()?,
                client_time: r.u64()?,
            },
            udp_op::OBJECT_STREAM => Self::ObjectStream {
                seq: r.u16()?,
                objects: r.list(|r| {
                    Ok(StreamedObject {
                        id: r.u64()?,
                        x: r.i64()?,
                        y: r.i64()?,
                        vx: r.f32()?,
                        vy: r.f32()?,
                        rotation: r.f32()?,
                    })
                })?,
            },
            udp_op::PLAYER_SUMMARY => Self::PlayerSummary {
                entries: r.list(|r| {
                    Ok(PlayerSummaryEntry {
                        account: r.u64()?,
                        temp_id: r.u16()?,
                        vessel: r.u64()?,
                    })
                })?,
            },
            udp_op::NOTIFY => Self::Notify {
                kind: NotifyKind::read(r)?,
                message: r.cstr()?,
            },
            udp_op::REGION_CUE => Self::RegionCue {
                vessel: r.u64()?,
                region: r.u32()?,
            },
            udp_op::OBJECT_DESTROYED => Self::ObjectDestroyed { object: r.u64()? },
            udp_op::TELESCOPE_SIGHT => Self::TelescopeSight {
                vessel: r.u64()?,
                fov_deg: r.f32()?,
                objects: r.list(|r| r.u64())?,
            },
            udp_op::VESSEL_STATE => Self::VesselState {
                vessel: r.u64()?,
                fuel: r.f32()?,
                power: r.f32()?,
                hull: r.f32()?,
                temperature: r.f32()?,
                stage: r.u8()?,
                flags: r.u8()?,
                landed: r.bool("landed")?,
            },
            udp_op::CARGO => Self::Cargo {
                vessel: r.u64()?,
                items: r.list(|r| Ok((r.u16()?, r.u32()?)))?,
            },
            udp_op::TERRAIN_ENTITIES => Self::TerrainEntities {
                planet: r.u64()?,
                entities: r.list(|r| {
                    Ok(TerrainEntityState {
                        id: r.i64()?,
                        x: r.f32()?,
                        y: r.f32()?,
                        moving: r.bool("moving")?,
                        dir_deg: r.f32()?,
                    })
                })?,
            },
            other => return Err(CodecError::UnknownOpcode(other as u16)),
        })
    }
}

impl Encode for ServerDatagram {
    fn encode(&self, w: &mut PacketWriter) {
        match self {
            Self::Latency { account, client_time } => {
                w.u8(udp_op::LATENCY).u64(*account).u64(*client_time);
            }
            Self::ObjectStream { seq, objects } => {
                w.u8(udp_op::OBJECT_STREAM).u16(*seq);
                w.list(objects, |w, o| {
                    w.u64(o.id).i64(o.x).i64(o.y).f32(o.vx).f32(o.vy).f32(o.rotation);
                });
            }
            Self::PlayerSummary { entries } => {
                w.u8(udp_op::PLAYER_SUMMARY);
                w.list(entries, |w, e| {
                    w.u64(e.account).u16(e.temp_id).u64(e.vessel);
                });
            }
            Self::Notify { kind, message } => {
                w.u8(udp_op::NOTIFY).u8(*kind as u8).cstr(message);
            }
            Self::RegionCue { vessel, region } => {
                w.u8(udp_op::REGION_CUE).u64(*vessel).u32(*region);
            }
            Self::ObjectDestroyed { object } => {
                w.u8(udp_op::OBJECT_DESTROYED).u64(*object);
            }
            Self::TelescopeSight {
                vessel,
                fov_deg,
                objects,
            } => {
                w.u8(udp_op::TELESCOPE_SIGHT).u64(*vessel).f32(*fov_deg);
                w.list(objects, |w, id| {
                    w.u64(*id);
                });
            }
            Self::VesselState {
                vessel,
                fuel,
                power,
                hull,
                temperature,
                stage,
                flags,
                landed,
            } => {
                w.u8(udp_op::VESSEL_STATE)
                    .u64(*vessel)
                    .f32(*fuel)
                    .f32(*power)
                    .f32(*hull)
                    .f32(*temperature)
                    .u8(*stage)
                    .u8(*flags)
                    .bool(*landed);
            }
            Self::Cargo { vessel, items } => {
                w.u8(udp_op::CARGO).u64(*vessel);
                w.list(items, |w, (resource, amount)| {
                    w.u16(*resource).u32(*amount);
                });
            }
            Self::TerrainEntities { planet, entities } => {
                w.u8(udp_op::TERRAIN_ENTITIES).u64(*planet);
                w.list(entities, |w, e| {
                    w.i64(e.id).f32(e.x).f32(e.y).bool(e.moving).f32(e.dir_deg);
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<ServerDatagram> {
        vec![
            ServerDatagram::Latency {
                account: 9,
                client_time: 123_456,
            },
            ServerDatagram::ObjectStream {
                seq: 7,
                objects: vec![StreamedObject {
                    id: 4,
                    x: -152_000_000,
                    y: 3,
                    vx: 0.5,
                    vy: -29.78,
                    rotation: 90.0,
                }],
            },
            ServerDatagram::PlayerSummary {
                entries: vec![PlayerSummaryEntry {
                    account: 9,
                    temp_id: 1,
                    vessel: 0,
                }],
            },
            ServerDatagram::notify(NotifyKind::Failure, "Insufficient funds"),
            ServerDatagram::RegionCue { vessel: 13, region: 5 },
            ServerDatagram::ObjectDestroyed { object: 13 },
            ServerDatagram::TelescopeSight {
                vessel: 13,
                fov_deg: 30.0,
                objects: vec![4, 6],
            },
            ServerDatagram::VesselState {
                vessel: 13,
                fuel: 10.0,
                power: 5.0,
                hull: 1.0,
                temperature: 290.0,
                stage: 1,
                flags: 3,
                landed: true,
            },
            ServerDatagram::Cargo {
                vessel: 13,
                items: vec![(1, 20), (2, 5)],
            },
            ServerDatagram::TerrainEntities {
                planet: 4,
                entities: vec![TerrainEntityState {
                    id: -1,
                    x: 2500.0,
                    y: 2500.0,
                    moving: false,
                    dir_deg: 0.0,
                }],
            },
        ]
    }

    #[test]
    fn server_datagrams_roundtrip() {
        for d in samples() {
            let bytes = d.to_bytes();
            let (decoded, used) = ServerDatagram::decode_prefix(&bytes).unwrap();
            assert_eq!(used, bytes.len());
            assert_eq!(decoded, d);
            assert_eq!(decoded.to_bytes(), bytes);
            for cut in 0..bytes.len() {
                assert!(matches!(
                    ServerDatagram::decode_prefix(&bytes[..cut]),
                    Err(CodecError::Truncated { .. })
                ));
            }
        }
    }

    #[test]
    fn client_datagrams_roundtrip() {
        for d in [
            ClientDatagram::Latency {
                account: 1,
                client_time: 2,
            },
            ClientDatagram::AstronautMove {
                astronaut: 3,
                mode: MoveMode::Target,
                x: 10.0,
                y: -4.0,
            },
        ] {
            let bytes = d.to_bytes();
            assert_eq!(ClientDatagram::decode_prefix(&bytes).unwrap(), (d, bytes.len()));
        }
        assert_eq!(
            ClientDatagram::decode_prefix(&[0x42]),
            Err(CodecError::UnknownOpcode(0x42))
        );
    }

    #[test]
    fn telescope_sight_always_carries_fov() {
        let bytes = ServerDatagram::TelescopeSight {
            vessel: 1,
            fov_deg: 12.0,
            objects: Vec::new(),
        }
        .to_bytes();
        assert_eq!(bytes.len(), 1 + 8 + 4 + 2);
        assert_eq!(&bytes[9..13], &12.0f32.to_le_bytes());
    }

    #[test]
    fn object_stream_batches_fit_a_datagram() {
        let objects: Vec<StreamedObject> = (0..100)
            .map(|i| StreamedObject {
                id: i,
                x: 0,
                y: 0,
                vx: 0.0,
                vy: 0.0,
                rotation: 0.0,
            })
            .collect();
        let batches = ServerDatagram::object_stream_batches(9, &objects);
        assert!(batches.len() > 1);
        let mut total = 0;
        for b in &batches {
            assert!(b.to_bytes().len() <= MAX_DATAGRAM_BYTES);
            if let ServerDatagram::ObjectStream { seq, objects } = b {
                assert_eq!(*seq, 9);
                total += objects.len();
            }
        }
        assert_eq!(total, 100);
    }

    #[test]
    fn stream_seq_wraps_after_65534() {
        assert_eq!(next_stream_seq(0), 1);
        assert_eq!(next_stream_seq(65533), 65534);
        assert_eq!(next_stream_seq(65534), 0);
    }
}
