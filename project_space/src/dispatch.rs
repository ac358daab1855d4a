//! Routes decoded TCP packets, datagrams and connection events to the
//! game. Every handler runs to completion against shared state; replies go
//! out through the output channels.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use engine_core::unix_millis;
use net::channels::{DisconnectReason, EventRx, NetEvent, UdpRx};
use net::protocol::create_agency_error;
use net::{ChatChannel, ClientDatagram, ClientPacket, NotifyKind, ServerDatagram, ServerPacket};
use session::SessionId;
use space::ObjectId;

use crate::agency::{lock, Agency, AgencyId};
use crate::error::{GameError, GameResult};
use crate::lifecycle::ShutdownRx;
use crate::terrain;
use crate::vessel;
use crate::world::World;

pub fn on_connected(world: &World, id: SessionId, peer: SocketAddr) {
    let created = world.sessions_mut().create_session_with_id(id, peer);
    match created {
        Ok(temp_id) => tracing::info!(session_id = %id, %peer, temp_id, "connection accepted"),
        Err(e) => {
            tracing::warn!(session_id = %id, error = %e, "session rejected");
            world.close_session(id);
        }
    }
}

pub fn on_disconnected(world: &World, id: SessionId, reason: &DisconnectReason) {
    let closed = world.sessions_mut().close(id);
    let Some(account) = closed.and_then(|s| s.account) else {
        tracing::debug!(session_id = %id, ?reason, "anonymous session closed");
        return;
    };
    world.chunks.remove_occupant(account, unix_millis());
    vessel::release_controlled(world, account);
    if let Some(agency) = world.players.agency_of(account) {
        terrain::release_astronauts(world, agency, account);
    }
    world.players.update(account, |p| p.terrain_planet = None);
    world.broadcast(&ServerPacket::PlayerLeft { account }, None);
    tracing::info!(session_id = %id, account, ?reason, "player disconnected");
}

pub fn handle_event(world: &World, event: NetEvent) {
    match event {
        NetEvent::Connected { session_id, peer } => on_connected(world, session_id, peer),
        NetEvent::Packet { session_id, packet } => handle_packet(world, session_id, packet),
        NetEvent::Disconnected { session_id, reason } => on_disconnected(world, session_id, &reason),
    }
}

/// Handles one TCP packet. Until IDENTIFY only the read-only queries are
/// served; anything else is dropped.
pub fn handle_packet(world: &World, id: SessionId, packet: ClientPacket) {
    let account = world.sessions().account_of(id);
    let Some(account) = account else {
        if !packet.allowed_before_identify() {
            tracing::debug!(session_id = %id, opcode = packet.opcode(), "packet before identify dropped");
            return;
        }
        match packet {
            ClientPacket::Identify { account } => identify(world, id, account),
            other => answer_query(world, id, &other),
        }
        return;
    };

    let result = match packet {
        ClientPacket::Identify { account: again } => {
            if again != account {
                tracing::warn!(session_id = %id, account, again, "second identify ignored");
            }
            Ok(())
        }
        ClientPacket::Keepalive
        | ClientPacket::InfoAboutAgencies
        | ClientPacket::ListOfAgencies
        | ClientPacket::GameJson => {
            answer_query(world, id, &packet);
            Ok(())
        }
        ClientPacket::Chat { channel, message } => {
            chat(world, account, channel, message);
            Ok(())
        }
        ClientPacket::CreateAgency { is_public, name } => {
            create_agency(world, id, account, is_public, &name);
            Ok(())
        }
        ClientPacket::ConstructBuilding {
            planet,
            building_type,
            angle,
        } => construct_building(world, account, planet, building_type, angle),
        ClientPacket::ConstructVessel { request } => vessel::construct_vessel(world, account, &request).map(|_| ()),
        ClientPacket::LeaveAgency => leave_agency(world, account),
        ClientPacket::JoinPublicAgency { agency } => join_agency(world, account, agency),
        ClientPacket::AgencyInvite { target } => invite(world, account, target),
        ClientPacket::VesselControl { vessel, action } => vessel::control_vessel(world, account, vessel, action),
        ClientPacket::UpgradeBuilding {
            planet,
            building_type,
            to_level,
        } => upgrade_building(world, account, planet, building_type, to_level),
        ClientPacket::SellResource {
            resource,
            count,
            planet,
        } => sell_resource(world, account, planet, resource, count),
        ClientPacket::CraftResources {
            building_type,
            planet,
            recipe,
        } => craft(world, account, planet, building_type, &recipe),
        ClientPacket::EnterTerrain { planet, last_hash } => {
            let reply = terrain::enter(world, account, planet, last_hash);
            world.send(id, &reply);
            Ok(())
        }
        ClientPacket::ExitTerrain => {
            let reply = terrain::exit(world, account);
            world.send(id, &reply);
            Ok(())
        }
        ClientPacket::ClaimQuest { quest } => claim_quest(world, account, quest),
    };

    if let Err(e) = result {
        tracing::debug!(account, error = %e, "request rejected");
        world.notify(account, NotifyKind::Failure, e.to_string());
    }
}

fn answer_query(world: &World, id: SessionId, packet: &ClientPacket) {
    let reply = match packet {
        ClientPacket::Keepalive => ServerPacket::Keepalive,
        ClientPacket::InfoAboutAgencies => world.agency_snapshot_packet(),
        ClientPacket::ListOfAgencies => world.agency_list_packet(),
        ClientPacket::GameJson => world.game_json_packet(),
        _ => return,
    };
    world.send(id, &reply);
}

fn identify(world: &World, id: SessionId, account: u64) {
    let result = world.sessions_mut().identify(id, account);
    let identified = match result {
        Ok(identified) => identified,
        Err(e) => {
            tracing::warn!(session_id = %id, account, error = %e, "identify failed");
            return;
        }
    };
    if let Some(old) = identified.replaced {
        world.close_session(old.session_id);
    }

    let player = world.players.get_or_create(account, world.config.game.starting_money);
    // A crash can leave these set in the saved record.
    vessel::release_controlled(world, account);
    world.players.update(account, |p| p.terrain_planet = None);
    if let Err(e) = world.chunks.set_occupant(account, player.location(), None, unix_millis()) {
        tracing::error!(account, error = %e, "could not place player");
    }

    world.broadcast(
        &ServerPacket::PlayerJoined {
            account,
            temp_id: identified.temp_id,
        },
        Some(id),
    );
    world.send(id, &world.roster_packet());
    world.send(id, &world.agency_snapshot_packet());
    world.send(id, &world.game_json_packet());
    if let Some(gamestate) = player.agency.and_then(|a| world.gamestate_packet(a)) {
        world.send(id, &gamestate);
    }
}

fn chat(world: &World, account: u64, channel: ChatChannel, message: String) {
    let packet = ServerPacket::Chat {
        channel,
        sender: account,
        message,
    };
    match channel {
        ChatChannel::Global => world.broadcast(&packet, None),
        ChatChannel::Agency => match world.players.agency_of(account) {
            Some(agency) => world.send_to_agency(agency, &packet),
            None => tracing::debug!(account, "agency chat without an agency dropped"),
        },
        ChatChannel::Administrator if world.config.is_admin(account) => world.broadcast(&packet, None),
        ChatChannel::Administrator => tracing::warn!(account, "admin chat from non-admin dropped"),
        ChatChannel::Directed | ChatChannel::ServerGeneral => {
            tracing::debug!(account, ?channel, "server-only chat channel from client dropped")
        }
    }
}

fn membership(world: &World, account: u64) -> GameResult<(AgencyId, Arc<Mutex<Agency>>)> {
    let id = world.players.agency_of(account).ok_or(GameError::NoAgency)?;
    let agency = world.agencies.get(id).ok_or(GameError::AgencyNotFound)?;
    Ok((id, agency))
}

/// Name of a planet (not a star) anywhere in resident space.
fn planet_name(world: &World, planet: u64) -> Option<String> {
    world
        .chunks
        .with_object(ObjectId(planet), |o| {
            (o.is_planet() && !o.object_type.is_star()).then(|| o.name.clone())
        })
        .flatten()
}

fn building_name(world: &World, building_type: u16) -> String {
    world
        .catalog
        .current()
        .building(building_type)
        .map(|b| b.name.clone())
        .unwrap_or_else(|| format!("Building {building_type}"))
}

/// Everyone's view of who belongs where.
fn membership_changed(world: &World) {
    world.broadcast_roster();
    world.broadcast(&world.agency_snapshot_packet(), None);
}

fn refresh_gamestate(world: &World, agency: AgencyId) {
    if let Some(packet) = world.gamestate_packet(agency) {
        world.send_to_agency(agency, &packet);
    }
}

/// Runs `f` on the agency and announces any quest it completed.
fn with_quests<R>(
    world: &World,
    agency_id: AgencyId,
    agency: &Mutex<Agency>,
    f: impl FnOnce(&mut Agency) -> GameResult<R>,
) -> GameResult<R> {
    let (result, completed) = {
        let mut a = lock(agency);
        let before = a.completed_quests();
        let result = f(&mut a)?;
        let completed: Vec<u32> = a.completed_quests().difference(&before).copied().collect();
        (result, completed)
    };
    world.quests_completed(agency_id, &completed);
    Ok(result)
}

fn create_agency(world: &World, id: SessionId, account: u64, is_public: bool, name: &str) {
    let catalog = world.catalog.current();
    let error = match world
        .agencies
        .create(name, is_public, account, &catalog, world.home_planet())
    {
        Ok(agency) => {
            let agency_id = lock(&agency).id;
            leave_current(world, account);
            world.players.update(account, |p| p.agency = Some(agency_id));
            world.stats().agency_created(agency_id, account);
            create_agency_error::OK
        }
        Err(GameError::NameTaken) => create_agency_error::NAME_EXISTS,
        Err(e) => {
            tracing::debug!(account, error = %e, "agency name rejected");
            create_agency_error::INVALID_NAME
        }
    };
    world.send(id, &ServerPacket::CreateAgencyReply { error });
    if error == create_agency_error::OK {
        membership_changed(world);
        if let Some(agency) = world.players.agency_of(account) {
            refresh_gamestate(world, agency);
        }
    }
}

/// Drops `account` from its agency, if any, and tells both sides.
fn leave_current(world: &World, account: u64) -> Option<AgencyId> {
    let old = world.players.agency_of(account)?;
    if world.players.get(account).is_some_and(|p| p.terrain_planet.is_some()) {
        terrain::exit(world, account);
    }
    terrain::release_astronauts(world, old, account);
    let flying = world.players.get(account).and_then(|p| p.controlled_vessel);
    let owned_by_old = flying.is_some_and(|v| {
        world
            .chunks
            .with_object(ObjectId(v), |o| o.vessel().is_some_and(|v| v.agency == old))
            .unwrap_or(false)
    });
    if owned_by_old {
        vessel::release_controlled(world, account);
    }
    if let Some(agency) = world.agencies.get(old) {
        lock(&agency).members.remove(&account);
    }
    world.players.update(account, |p| p.agency = None);

    let message = format!("{account} left the agency");
    world.notify(account, NotifyKind::Generic, message.clone());
    world.notify_agency(old, NotifyKind::Generic, message);
    tracing::info!(account, agency = old, "left agency");
    Some(old)
}

fn leave_agency(world: &World, account: u64) -> GameResult<()> {
    leave_current(world, account).ok_or(GameError::NoAgency)?;
    membership_changed(world);
    Ok(())
}

fn join_agency(world: &World, account: u64, agency_id: AgencyId) -> GameResult<()> {
    let agency = world.agencies.get(agency_id).ok_or(GameError::AgencyNotFound)?;
    {
        let a = lock(&agency);
        if a.is_member(account) {
            drop(a);
            world.notify(account, NotifyKind::Generic, GameError::AlreadyMember.to_string());
            return Ok(());
        }
        if !a.is_public && !a.invited.contains(&account) {
            return Err(GameError::AgencyPrivate);
        }
    }
    leave_current(world, account);
    {
        let mut a = lock(&agency);
        a.invited.remove(&account);
        a.members.insert(account);
    }
    world.players.update(account, |p| p.agency = Some(agency_id));
    world.notify_agency(agency_id, NotifyKind::Generic, format!("{account} joined the agency"));
    tracing::info!(account, agency = agency_id, "joined agency");
    membership_changed(world);
    refresh_gamestate(world, agency_id);
    Ok(())
}

fn invite(world: &World, account: u64, target: u64) -> GameResult<()> {
    let (agency_id, agency) = membership(world, account)?;
    let name = {
        let mut a = lock(&agency);
        if a.is_member(target) {
            return Err(GameError::TargetAlreadyMember);
        }
        a.invited.insert(target);
        a.name.clone()
    };
    world.send_to_account(
        target,
        &ServerPacket::Chat {
            channel: ChatChannel::Directed,
            sender: account,
            message: format!("invited you to join {name}"),
        },
    );
    world.notify(account, NotifyKind::Generic, "Invite sent.");
    tracing::debug!(account, target, agency = agency_id, "invite sent");
    Ok(())
}

fn construct_building(world: &World, account: u64, planet: u64, building_type: u16, angle: u16) -> GameResult<()> {
    let (agency_id, agency) = membership(world, account)?;
    let planet_name = planet_name(world, planet).ok_or(GameError::PlanetNotFound)?;
    let catalog = world.catalog.current();
    let agency_name = with_quests(world, agency_id, &agency, |a| {
        a.construct(&catalog, planet, building_type, angle)?;
        Ok(a.name.clone())
    })?;
    let building = building_name(world, building_type);
    world.notify_agency(
        agency_id,
        NotifyKind::Success,
        format!("{agency_name} started construction of {building} on {planet_name}"),
    );
    refresh_gamestate(world, agency_id);
    Ok(())
}

fn upgrade_building(world: &World, account: u64, planet: u64, building_type: u16, to_level: u16) -> GameResult<()> {
    let (agency_id, agency) = membership(world, account)?;
    let catalog = world.catalog.current();
    let (cost, level) = lock(&agency).upgrade(&catalog, planet, building_type, to_level)?;
    let building = building_name(world, building_type);
    let place = planet_name(world, planet).unwrap_or_else(|| format!("planet {planet}"));
    tracing::debug!(account, agency = agency_id, cost, level, "building upgraded");
    world.chat_to_agency(
        agency_id,
        ChatChannel::ServerGeneral,
        0,
        format!("{{{account}}} upgraded {building} on {place} to level {level}"),
    );
    refresh_gamestate(world, agency_id);
    Ok(())
}

fn sell_resource(world: &World, account: u64, planet: u64, resource: u16, count: u16) -> GameResult<()> {
    let (agency_id, agency) = membership(world, account)?;
    let catalog = world.catalog.current();
    let credit = with_quests(world, agency_id, &agency, |a| a.sell(&catalog, planet, resource, count))?;
    let name = catalog
        .resource(resource)
        .map(|r| r.name.clone())
        .unwrap_or_default();
    world.notify(account, NotifyKind::Success, format!("Sold {count} {name} for {credit}"));
    refresh_gamestate(world, agency_id);
    Ok(())
}

fn craft(world: &World, account: u64, planet: u64, building_type: u16, recipe: &str) -> GameResult<()> {
    let (agency_id, agency) = membership(world, account)?;
    let catalog = world.catalog.current();
    lock(&agency).craft(&catalog, planet, building_type, recipe)?;
    world.notify(account, NotifyKind::Success, format!("Crafted {recipe}"));
    refresh_gamestate(world, agency_id);
    Ok(())
}

fn claim_quest(world: &World, account: u64, quest: u32) -> GameResult<()> {
    let (agency_id, agency) = membership(world, account)?;
    let catalog = world.catalog.current();
    let reward = lock(&agency).claim_quest(&catalog, quest)?;
    world.notify_agency(agency_id, NotifyKind::Success, format!("Quest reward collected: {reward}"));
    refresh_gamestate(world, agency_id);
    Ok(())
}

/// LATENCY binds the sender's UDP endpoint and is echoed; other datagrams
/// are attributed through that binding.
pub fn handle_datagram(world: &World, from: SocketAddr, datagram: ClientDatagram) {
    match datagram {
        ClientDatagram::Latency { account, client_time } => {
            let bound = world.sessions_mut().bind_udp(account, from);
            if bound.is_some() {
                world.send_datagram(from, ServerDatagram::Latency { account, client_time });
            }
        }
        ClientDatagram::AstronautMove { astronaut, mode, x, y } => {
            let account = world
                .sessions()
                .broadcast_snapshot()
                .into_iter()
                .find(|v| v.udp_addr == Some(from))
                .map(|v| v.account);
            match account {
                Some(account) => {
                    if !terrain::astronaut_move(world, account, astronaut, mode, x, y) {
                        tracing::debug!(account, astronaut, "astronaut move ignored");
                    }
                }
                None => tracing::debug!(%from, "datagram from unbound endpoint"),
            }
        }
    }
}

/// Feeds network events and datagrams to the handlers until shutdown.
pub async fn run_dispatcher(world: Arc<World>, mut events: EventRx, mut datagrams: UdpRx, mut shutdown: ShutdownRx) {
    loop {
        tokio::select! {
            Some(event) = events.recv() => handle_event(&world, event),
            Some(inbound) = datagrams.recv() => handle_datagram(&world, inbound.from, inbound.datagram),
            _ = shutdown.wait() => break,
            else => break,
        }
    }
    tracing::info!(online = world.online_accounts().len(), "dispatcher stopped");
}
