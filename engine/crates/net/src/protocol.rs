//! TCP control catalogue: a `u16` opcode followed by its fixed payload.

use crate::codec::{CodecError, Decode, Encode, PacketReader, PacketWriter};

/// Client → server opcodes.
pub mod client_op {
    pub const IDENTIFY: u16 = 0x0000;
    pub const CHAT: u16 = 0x0002;
    pub const KEEPALIVE: u16 = 0x0004;
    pub const INFO_ABOUT_AGENCIES: u16 = 0x0007;
    pub const CREATE_AGENCY: u16 = 0x0008;
    pub const CONSTRUCT_BUILDING: u16 = 0x0009;
    pub const CONSTRUCT_VESSEL: u16 = 0x000A;
    pub const LEAVE_AGENCY: u16 = 0x000B;
    pub const LIST_OF_AGENCIES: u16 = 0x000C;
    pub const JOIN_PUBLIC_AGENCY: u16 = 0x000D;
    pub const AGENCY_INVITE: u16 = 0x000E;
    pub const VESSEL_CONTROL: u16 = 0x000F;
    pub const UPGRADE_BUILDING: u16 = 0x0010;
    pub const SELL_RESOURCE: u16 = 0x0011;
    pub const CRAFT_RESOURCES: u16 = 0x0012;
    pub const GAME_JSON: u16 = 0x0013;
    pub const ENTER_TERRAIN: u16 = 0x0015;
    pub const EXIT_TERRAIN: u16 = 0x0017;
    pub const CLAIM_QUEST: u16 = 0x0019;
}

/// Server → client opcodes.
pub mod server_op {
    pub const PLAYER_ROSTER: u16 = 0x0001;
    pub const CHAT: u16 = 0x0002;
    pub const PLAYER_JOINED: u16 = 0x0003;
    pub const KEEPALIVE: u16 = 0x0004;
    pub const PLAYER_LEFT: u16 = 0x0005;
    pub const AGENCY_SNAPSHOT: u16 = 0x0007;
    pub const CREATE_AGENCY_REPLY: u16 = 0x0008;
    pub const AGENCY_LIST: u16 = 0x000C;
    pub const VESSEL_CONTROLLER: u16 = 0x000F;
    pub const GAME_JSON: u16 = 0x0013;
    pub const AGENCY_GAMESTATE: u16 = 0x0014;
    pub const ENTER_TERRAIN_REPLY: u16 = 0x0016;
    pub const EXIT_TERRAIN_REPLY: u16 = 0x0018;
}

/// CREATE_AGENCY_REPLY error codes.
pub mod create_agency_error {
    pub const OK: u8 = 0;
    pub const NAME_EXISTS: u8 = 1;
    pub const INVALID_NAME: u8 = 2;
}

/// ENTER_TERRAIN_REPLY / EXIT_TERRAIN_REPLY error codes.
pub mod terrain_error {
    pub const OK: u8 = 0;
    pub const NO_AGENCY: u8 = 1;
    pub const PLANET_NOT_LOADED: u8 = 2;
    pub const NOT_IN_SAME_SYSTEM: u8 = 3;
    pub const NOT_A_PLANET: u8 = 4;
    pub const NOT_DISCOVERED: u8 = 5;
    pub const NO_PRESENCE: u8 = 6;

    /// Exit only: the player is not viewing a terrain.
    pub const NOT_IN_TERRAIN: u8 = 2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChatChannel {
    Global = 0,
    Agency = 1,
    Administrator = 2,
    /// Server-originated, addressed to one player (invites).
    Directed = 3,
    /// Server-originated notices to everyone.
    ServerGeneral = 4,
}

impl ChatChannel {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Global,
            1 => Self::Agency,
            2 => Self::Administrator,
            3 => Self::Directed,
            4 => Self::ServerGeneral,
            _ => return None,
        })
    }

    fn read(r: &mut PacketReader<'_>) -> Result<Self, CodecError> {
        let v = r.u8()?;
        Self::from_u8(v).ok_or(CodecError::InvalidValue {
            field: "chat channel",
            value: v as u64,
        })
    }
}

/// VESSEL_CONTROL key byte plus its trailing arguments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VesselAction {
    RequestControl,
    ReleaseControl,
    Thrust(bool),
    RotateLeft(bool),
    RotateRight(bool),
    DeployStage,
    SetTelescopeTargetAngle(f32),
    SetSystemState { system: u16, state: u8 },
}

impl VesselAction {
    pub fn key(&self) -> u8 {
        match self {
            Self::RequestControl => 0,
            Self::ReleaseControl => 1,
            Self::Thrust(true) => 2,
            Self::Thrust(false) => 3,
            Self::RotateLeft(true) => 4,
            Self::RotateLeft(false) => 5,
            Self::RotateRight(true) => 6,
            Self::RotateRight(false) => 7,
            Self::DeployStage => 8,
            Self::SetTelescopeTargetAngle(_) => 9,
            Self::SetSystemState { .. } => 10,
        }
    }

    fn read(r: &mut PacketReader<'_>) -> Result<Self, CodecError> {
        let key = r.u8()?;
        Ok(match key {
            0 => Self::RequestControl,
            1 => Self::ReleaseControl,
            2 => Self::Thrust(true),
            3 => Self::Thrust(false),
            4 => Self::RotateLeft(true),
            5 => Self::RotateLeft(false),
            6 => Self::RotateRight(true),
            7 => Self::RotateRight(false),
            8 => Self::DeployStage,
            9 => Self::SetTelescopeTargetAngle(r.f32()?),
            10 => Self::SetSystemState {
                system: r.u16()?,
                state: r.u8()?,
            },
            other => {
                return Err(CodecError::InvalidValue {
                    field: "vessel control key",
                    value: other as u64,
                })
            }
        })
    }

    fn write(&self, w: &mut PacketWriter) {
        w.u8(self.key());
        match *self {
            Self::SetTelescopeTargetAngle(angle) => {
                w.f32(angle);
            }
            Self::SetSystemState { system, state } => {
                w.u16(system).u8(state);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    Identify { account: u64 },
    Chat { channel: ChatChannel, message: String },
    Keepalive,
    InfoAboutAgencies,
    CreateAgency { is_public: bool, name: String },
    ConstructBuilding { planet: u64, building_type: u16, angle: u16 },
    ConstructVessel { request: String },
    LeaveAgency,
    ListOfAgencies,
    JoinPublicAgency { agency: u64 },
    AgencyInvite { target: u64 },
    VesselControl { vessel: u64, action: VesselAction },
    UpgradeBuilding { planet: u64, building_type: u16, to_level: u16 },
    SellResource { resource: u16, count: u16, planet: u64 },
    CraftResources { building_type: u16, planet: u64, recipe: String },
    GameJson,
    EnterTerrain { planet: u64, last_hash: u64 },
    ExitTerrain,
    ClaimQuest { quest: u32 },
}

impl ClientPacket {
    pub fn opcode(&self) -> u16 {
        use client_op::*;
        match self {
            Self::Identify { .. } => IDENTIFY,
            Self::Chat { .. } => CHAT,
            Self::Keepalive => KEEPALIVE,
            Self::InfoAboutAgencies => INFO_ABOUT_AGENCIES,
            Self::CreateAgency { .. } => CREATE_AGENCY,
            Self::ConstructBuilding { .. } => CONSTRUCT_BUILDING,
            Self::ConstructVessel { .. } => CONSTRUCT_VESSEL,
            Self::LeaveAgency => LEAVE_AGENCY,
            Self::ListOfAgencies => LIST_OF_AGENCIES,
            Self::JoinPublicAgency { .. } => JOIN_PUBLIC_AGENCY,
            Self::AgencyInvite { .. } => AGENCY_INVITE,
            Self::VesselControl { .. } => VESSEL_CONTROL,
            Self::UpgradeBuilding { .. } => UPGRADE_BUILDING,
            Self::SellResource { .. } => SELL_RESOURCE,
            Self::CraftResources { .. } => CRAFT_RESOURCES,
            Self::GameJson => GAME_JSON,
            Self::EnterTerrain { .. } => ENTER_TERRAIN,
            Self::ExitTerrain => EXIT_TERRAIN,
            Self::ClaimQuest { .. } => CLAIM_QUEST,
        }
    }

    /// Packets a session may send before it has identified.
    pub fn allowed_before_identify(&self) -> bool {
        matches!(
            self,
            Self::Identify { .. } | Self::Keepalive | Self::ListOfAgencies | Self::InfoAboutAgencies | Self::GameJson
        )
    }
}

impl Decode for ClientPacket {
    fn decode(r: &mut PacketReader<'_>) -> Result<Self, CodecError> {
        use client_op::*;
        let op = r.u16()?;
        Ok(match op {
            IDENTIFY => Self::Identify { account: r.u64()? },
            CHAT => Self::Chat {
                channel: ChatChannel::read(r)?,
                message: r.cstr()?,
            },
            KEEPALIVE => Self::Keepalive,
            INFO_ABOUT_AGENCIES => Self::InfoAboutAgencies,
            CREATE_AGENCY => Self::CreateAgency {
                is_public: r.bool("is_public")?,
                name: r.cstr()?,
            },
            CONSTRUCT_BUILDING => Self::ConstructBuilding {
                planet: r.u64()?,
                building_type: r.u16()?,
                angle: r.u16()?,
            },
            CONSTRUCT_VESSEL => Self::ConstructVessel { request: r.cstr()? },
            LEAVE_AGENCY => Self::LeaveAgency,
            LIST_OF_AGENCIES => Self::ListOfAgencies,
            JOIN_PUBLIC_AGENCY => Self::JoinPublicAgency { agency: r.u64()? },
            AGENCY_INVITE => Self::AgencyInvite { target: r.u64()? },
            VESSEL_CONTROL => Self::VesselControl {
                vessel: r.u64()?,
                action: VesselAction::read(r)?,
            },
            UPGRADE_BUILDING => Self::UpgradeBuilding {
                planet: r.u64()?,
                building_type: r.u16()?,
                to_level: r.u16()?,
            },
            SELL_RESOURCE => Self::SellResource {
                resource: r.u16()?,
                count: r.u16()?,
                planet: r.u64()?,
            },
            CRAFT_RESOURCES => Self::CraftResources {
                building_type: r.u16()?,
                planet: r.u64()?,
                recipe: r.cstr()?,
            },
            GAME_JSON => Self::GameJson,
            ENTER_TERRAIN => Self::EnterTerrain {
                planet: r.u64()?,
                last_hash: r.u64()?,
            },
            EXIT_TERRAIN => Self::ExitTerrain,
            CLAIM_QUEST => Self::ClaimQuest { quest: r.u32()? },
            other => return Err(CodecError::UnknownOpcode(other)),
        })
    }
}

impl Encode for ClientPacket {
    fn encode(&self, w: &mut PacketWriter) {
        w.u16(self.opcode());
        match self {
            Self::Identify { account } => {
                w.u64(*account);
            }
            Self::Chat { channel, message } => {
                w.u8(*channel as u8).cstr(message);
            }
            Self::CreateAgency { is_public, name } => {
                w.bool(*is_public).cstr(name);
            }
            Self::ConstructBuilding {
                planet,
                building_type,
                angle,
            } => {
                w.u64(*planet).u16(*building_type).u16(*angle);
            }
            Self::ConstructVessel { request } => {
                w.cstr(request);
            }
            Self::JoinPublicAgency { agency } => {
                w.u64(*agency);
            }
            Self::AgencyInvite { target } => {
                w.u64(*target);
            }
            Self::VesselControl { vessel, action } => {
                w.u64(*vessel);
                action.write(w);
            }
            Self::UpgradeBuilding {
                planet,
                building_type,
                to_level,
            } => {
                w.u64(*planet).u16(*building_type).u16(*to_level);
            }
            Self::SellResource {
                resource,
                count,
                planet,
            } => {
                w.u16(*resource).u16(*count).u64(*planet);
            }
            Self::CraftResources {
                building_type,
                planet,
                recipe,
            } => {
                w.u16(*building_type).u64(*planet).cstr(recipe);
            }
            Self::EnterTerrain { planet, last_hash } => {
                w.u64(*planet).u64(*last_hash);
            }
            Self::ClaimQuest { quest } => {
                w.u32(*quest);
            }
            Self::Keepalive
            | Self::InfoAboutAgencies
            | Self::LeaveAgency
            | Self::ListOfAgencies
            | Self::GameJson
            | Self::ExitTerrain => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterEntry {
    pub account: u64,
    pub temp_id: u16,
    pub galaxy: u32,
    pub system: u32,
    pub agency: u64,
    /// 0 when the player is not viewing a terrain.
    pub terrain_planet: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgencyListEntry {
    pub id: u64,
    pub is_public: bool,
    pub members: u16,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    PlayerRoster { entries: Vec<RosterEntry> },
    Chat { channel: ChatChannel, sender: u64, message: String },
    PlayerJoined { account: u64, temp_id: u16 },
    Keepalive,
    PlayerLeft { account: u64 },
    AgencySnapshot { json: Vec<u8> },
    CreateAgencyReply { error: u8 },
    AgencyList { entries: Vec<AgencyListEntry> },
    /// `controller == 0` means released.
    VesselController { vessel: u64, controller: u64 },
    GameJson { json: Vec<u8> },
    AgencyGamestate { json: Vec<u8> },
    /// `terrain` is empty when the client's cached hash is current.
    EnterTerrainReply { error: u8, planet: u64, hash: u64, terrain: Vec<u8> },
    ExitTerrainReply { error: u8, planet: u64 },
}

impl ServerPacket {
    pub fn opcode(&self) -> u16 {
        use server_op::*;
        match self {
            Self::PlayerRoster { .. } => PLAYER_ROSTER,
            Self::Chat { .. } => CHAT,
            Self::PlayerJoined { .. } => PLAYER_JOINED,
            Self::Keepalive => KEEPALIVE,
            Self::PlayerLeft { .. } => PLAYER_LEFT,
            Self::AgencySnapshot { .. } => AGENCY_SNAPSHOT,
            Self::CreateAgencyReply { .. } => CREATE_AGENCY_REPLY,
            Self::AgencyList { .. } => AGENCY_LIST,
            Self::VesselController { .. } => VESSEL_CONTROLLER,
            Self::GameJson { .. } => GAME_JSON,
            Self::AgencyGamestate { .. } => AGENCY_GAMESTATE,
            Self::EnterTerrainReply { .. } => ENTER_TERRAIN_REPLY,
            Self::ExitTerrainReply { .. } => EXIT_TERRAIN_REPLY,
        }
    }
}

impl Decode for ServerPacket {
    fn decode(r: &mut PacketReader<'_>) -> Result<Self, CodecError> {
        use server_op::*;
        let op = r.u16()?;
        Ok(match op {
            PLAYER_ROSTER => Self::PlayerRoster {
                entries: r.list(|r| {
                    Ok(RosterEntry {
                        account: r.u64()?,
                        temp_id: r.u16()?,
                        galaxy: r.u32()?,
                        system: r.u32()?,
                        agency: r.u64()?,
                        terrain_planet: r.u64()?,
                    })
                })?,
            },
            CHAT => Self::Chat {
                channel: ChatChannel::read(r)?,
                sender: r.u64()?,
                message: r.cstr()?,
            },
            PLAYER_JOINED => Self::PlayerJoined {
                account: r.u64()?,
                temp_id: r.u16()?,
            },
            KEEPALIVE => Self::Keepalive,
            PLAYER_LEFT => Self::PlayerLeft { account: r.u64()? },
            AGENCY_SNAPSHOT => Self::AgencySnapshot { json: r.blob()? },
            CREATE_AGENCY_REPLY => Self::CreateAgencyReply { error: r.u8()? },
            AGENCY_LIST => Self::AgencyList {
                entries: r.list(|r| {
                    Ok(AgencyListEntry {
                        id: r.u64()?,
                        is_public: r.bool("is_public")?,
                        members: r.u16()?,
                        name: r.cstr()?,
                    })
                })?,
            },
            VESSEL_CONTROLLER => Self::VesselController {
                vessel: r.u64()?,
                controller: r.u64()?,
            },
            GAME_JSON => Self::GameJson { json: r.blob()? },
            AGENCY_GAMESTATE => Self::AgencyGamestate { json: r.blob()? },
            ENTER_TERRAIN_REPLY => Self::EnterTerrainReply {
                error: r.u8()?,
                planet: r.u64()?,
                hash: r.u64()?,
                terrain: r.blob()?,
            },
            EXIT_TERRAIN_REPLY => Self::ExitTerrainReply {
                error: r.u8()?,
                planet: r.u64()?,
            },
            other => return Err(CodecError::UnknownOpcode(other)),
        })
    }
}

impl Encode for ServerPacket {
    fn encode(&self, w: &mut PacketWriter) {
        w.u16(self.opcode());
        match self {
            Self::PlayerRoster { entries } => {
                w.list(entries, |w, e| {
                    w.u64(e.account)
                        .u16(e.temp_id)
                        .u32(e.galaxy)
                        .u32(e.system)
                        .u64(e.agency)
                        .u64(e.terrain_planet);
                });
            }
            Self::Chat {
                channel,
                sender,
                message,
            } => {
                w.u8(*channel as u8).u64(*sender).cstr(message);
            }
            Self::PlayerJoined { account, temp_id } => {
                w.u64(*account).u16(*temp_id);
            }
            Self::Keepalive => {}
            Self::PlayerLeft { account } => {
                w.u64(*account);
            }
            Self::AgencySnapshot { json } | Self::GameJson { json } | Self::AgencyGamestate { json } => {
                w.blob(json);
            }
            Self::CreateAgencyReply { error } => {
                w.u8(*error);
            }
            Self::AgencyList { entries } => {
                w.list(entries, |w, e| {
                    w.u64(e.id).bool(e.is_public).u16(e.members).cstr(&e.name);
                });
            }
            Self::VesselController { vessel, controller } => {
                w.u64(*vessel).u64(*controller);
            }
            Self::EnterTerrainReply {
                error,
                planet,
                hash,
                terrain,
            } => {
                w.u8(*error).u64(*planet).u64(*hash).blob(terrain);
            }
            Self::ExitTerrainReply { error, planet } => {
                w.u8(*error).u64(*planet);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_samples() -> Vec<ClientPacket> {
        vec![
            ClientPacket::Identify { account: 76561198000000001 },
            ClientPacket::Chat {
                channel: ChatChannel::Agency,
                message: "hello crew".into(),
            },
            ClientPacket::Keepalive,
            ClientPacket::InfoAboutAgencies,
            ClientPacket::CreateAgency {
                is_public: true,
                name: "Orbital Works".into(),
            },
            ClientPacket::ConstructBuilding {
                planet: 4,
                building_type: 2,
                angle: 270,
            },
            ClientPacket::ConstructVessel {
                request: r#"{"name":"Scout","planet":4,"vessel_data":[]}"#.into(),
            },
            ClientPacket::LeaveAgency,
            ClientPacket::ListOfAgencies,
            ClientPacket::JoinPublicAgency { agency: 3 },
            ClientPacket::AgencyInvite { target: 99 },
            ClientPacket::VesselControl {
                vessel: 13,
                action: VesselAction::Thrust(true),
            },
            ClientPacket::VesselControl {
                vessel: 13,
                action: VesselAction::SetTelescopeTargetAngle(42.5),
            },
            ClientPacket::VesselControl {
                vessel: 13,
                action: VesselAction::SetSystemState { system: 7, state: 1 },
            },
            ClientPacket::UpgradeBuilding {
                planet: 4,
                building_type: 1,
                to_level: 2,
            },
            ClientPacket::SellResource {
                resource: 3,
                count: 10,
                planet: 4,
            },
            ClientPacket::CraftResources {
                building_type: 5,
                planet: 4,
                recipe: "steel".into(),
            },
            ClientPacket::GameJson,
            ClientPacket::EnterTerrain {
                planet: 4,
                last_hash: 0xdead_beef,
            },
            ClientPacket::ExitTerrain,
            ClientPacket::ClaimQuest { quest: 12 },
        ]
    }

    fn server_samples() -> Vec<ServerPacket> {
        vec![
            ServerPacket::PlayerRoster {
                entries: vec![
                    RosterEntry {
                        account: 1,
                        temp_id: 1,
                        galaxy: 1,
                        system: 1,
                        agency: 0,
                        terrain_planet: 0,
                    },
                    RosterEntry {
                        account: 2,
                        temp_id: 2,
                        galaxy: 1,
                        system: 0,
                        agency: 5,
                        terrain_planet: 4,
                    },
                ],
            },
            ServerPacket::Chat {
                channel: ChatChannel::Global,
                sender: 1,
                message: "hi".into(),
            },
            ServerPacket::PlayerJoined { account: 1, temp_id: 3 },
            ServerPacket::Keepalive,
            ServerPacket::PlayerLeft { account: 1 },
            ServerPacket::AgencySnapshot {
                json: br#"{"agencies":[]}"#.to_vec(),
            },
            ServerPacket::CreateAgencyReply {
                error: create_agency_error::NAME_EXISTS,
            },
            ServerPacket::AgencyList {
                entries: vec![AgencyListEntry {
                    id: 1,
                    is_public: false,
                    members: 2,
                    name: "Orbital Works".into(),
                }],
            },
            ServerPacket::VesselController {
                vessel: 13,
                controller: 0,
            },
            ServerPacket::GameJson { json: b"{}".to_vec() },
            ServerPacket::AgencyGamestate { json: b"{}".to_vec() },
            ServerPacket::EnterTerrainReply {
                error: terrain_error::OK,
                planet: 4,
                hash: 77,
                terrain: Vec::new(),
            },
            ServerPacket::ExitTerrainReply {
                error: terrain_error::NOT_IN_TERRAIN,
                planet: 0,
            },
        ]
    }

    #[test]
    fn client_packets_roundtrip_byte_exact() {
        for packet in client_samples() {
            let bytes = packet.to_bytes();
            let (decoded, used) = ClientPacket::decode_prefix(&bytes).unwrap();
            assert_eq!(used, bytes.len(), "{packet:?}");
            assert_eq!(decoded, packet);
            assert_eq!(decoded.to_bytes(), bytes);
        }
    }

    #[test]
    fn server_packets_roundtrip_byte_exact() {
        for packet in server_samples() {
            let bytes = packet.to_bytes();
            let (decoded, used) = ServerPacket::decode_prefix(&bytes).unwrap();
            assert_eq!(used, bytes.len(), "{packet:?}");
            assert_eq!(decoded.to_bytes(), bytes);
        }
    }

    #[test]
    fn every_strict_prefix_is_truncated() {
        for bytes in client_samples().iter().map(Encode::to_bytes) {
            for cut in 0..bytes.len() {
                assert!(
                    matches!(ClientPacket::decode_prefix(&bytes[..cut]), Err(CodecError::Truncated { .. })),
                    "prefix {cut} of {bytes:?}"
                );
            }
        }
        for bytes in server_samples().iter().map(Encode::to_bytes) {
            for cut in 0..bytes.len() {
                assert!(matches!(
                    ServerPacket::decode_prefix(&bytes[..cut]),
                    Err(CodecError::Truncated { .. })
                ));
            }
        }
    }

    #[test]
    fn identify_wire_layout() {
        let bytes = ClientPacket::Identify { account: 0x0102 }.to_bytes();
        assert_eq!(bytes, vec![0x00, 0x00, 0x02, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn unknown_opcode_and_bad_key_are_reported() {
        assert_eq!(
            ClientPacket::decode_prefix(&[0xff, 0x00]),
            Err(CodecError::UnknownOpcode(0x00ff))
        );
        let mut bytes = ClientPacket::VesselControl {
            vessel: 1,
            action: VesselAction::DeployStage,
        }
        .to_bytes();
        *bytes.last_mut().unwrap() = 42;
        assert!(matches!(
            ClientPacket::decode_prefix(&bytes),
            Err(CodecError::InvalidValue { .. })
        ));
    }

    #[test]
    fn pre_identify_policy() {
        assert!(ClientPacket::GameJson.allowed_before_identify());
        assert!(ClientPacket::Keepalive.allowed_before_identify());
        assert!(!ClientPacket::LeaveAgency.allowed_before_identify());
        assert!(!ClientPacket::ClaimQuest { quest: 1 }.allowed_before_identify());
    }
}
