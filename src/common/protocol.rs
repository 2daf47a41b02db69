//! # Wire Protocol
//!
//! Every link in the CDN speaks newline-terminated ASCII with whitespace
//! separated tokens. This module owns the grammar for all of them:
//!
//! | Link | Requests |
//! |---|---|
//! | Client → Index | `HELLO`, `GET`, `LIST_FILES`, `LIST_SERVERS` |
//! | Content → Index | `REGISTER`, `ADD_FILE`, `DONE_FILES`, `UPDATE_LOAD` |
//! | Client → Content | `GET` |
//! | Content → Monitor (UDP) | `HEARTBEAT` |
//! | Index → Monitor | `LIST_SERVERS`, `REGISTER_INDEX`, `PING` |
//! | Monitor → Index | `SERVER_DOWN` |
//!
//! Requests parse from a single line into an enum and render back with
//! `Display`, so both ends of a link share one definition.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const WELCOME: &str = "WELCOME MICRO-CDN";
pub const END: &str = "END";
pub const OK: &str = "OK";
pub const OK_REGISTERED: &str = "OK REGISTERED";
pub const OK_FILES_ADDED: &str = "OK FILES_ADDED";
pub const OK_INDEX_REGISTERED: &str = "OK INDEX_REGISTERED";
pub const PONG: &str = "PONG";
pub const ERR_FILE_NOT_FOUND: &str = "ERROR FILE_NOT_FOUND";
pub const ERR_INVALID_FORMAT: &str = "ERROR INVALID_FORMAT";
pub const ERR_UNKNOWN_COMMAND: &str = "ERROR UNKNOWN_COMMAND";

/// Failure to turn a line into a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("malformed `{0}` line")]
    InvalidFormat(String),
}

impl ProtocolError {
    /// The `ERROR ...` line a server answers with.
    pub fn response(&self) -> &'static str {
        match self {
            ProtocolError::InvalidFormat(_) => ERR_INVALID_FORMAT,
            ProtocolError::Empty | ProtocolError::UnknownCommand(_) => ERR_UNKNOWN_COMMAND,
        }
    }
}

/// Split a line into its command token and arguments.
fn tokens(line: &str) -> Result<(&str, Vec<&str>), ProtocolError> {
    let mut parts = line.split_whitespace();
    let command = parts.next().ok_or(ProtocolError::Empty)?;
    Ok((command, parts.collect()))
}

fn expect_args(command: &str, args: &[&str], count: usize) -> Result<(), ProtocolError> {
    if args.len() != count {
        return Err(ProtocolError::InvalidFormat(command.to_string()));
    }
    Ok(())
}

fn field<T: FromStr>(command: &str, token: &str) -> Result<T, ProtocolError> {
    token
        .parse()
        .map_err(|_| ProtocolError::InvalidFormat(command.to_string()))
}

// ============================================================================
// SHARED RECORDS
// ============================================================================

/// Liveness of a content server as seen by the Monitor or the Index Server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Alive,
    Dead,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Alive => write!(f, "alive"),
            ServerStatus::Dead => write!(f, "dead"),
        }
    }
}

impl FromStr for ServerStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alive" => Ok(ServerStatus::Alive),
            "dead" => Ok(ServerStatus::Dead),
            other => Err(ProtocolError::InvalidFormat(other.to_string())),
        }
    }
}

/// One `SERVER <id> <ip> <port> <load> <status>` line of a `LIST_SERVERS` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLine {
    pub server_id: String,
    pub ip: String,
    pub port: u16,
    pub load: u32,
    pub status: ServerStatus,
}

impl ServerLine {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (command, args) = tokens(line)?;
        if command != "SERVER" {
            return Err(ProtocolError::UnknownCommand(command.to_string()));
        }
        expect_args(command, &args, 5)?;
        Ok(Self {
            server_id: args[0].to_string(),
            ip: args[1].to_string(),
            port: field(command, args[2])?,
            load: field(command, args[3])?,
            status: args[4].parse()?,
        })
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SERVER {} {} {} {} {}",
            self.server_id, self.ip, self.port, self.load, self.status
        )
    }
}

/// One `FILE <name> <size>` line of a `LIST_FILES` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLine {
    pub name: String,
    pub size: u64,
}

impl FileLine {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (command, args) = tokens(line)?;
        if command != "FILE" {
            return Err(ProtocolError::UnknownCommand(command.to_string()));
        }
        expect_args(command, &args, 2)?;
        Ok(Self {
            name: args[0].to_string(),
            size: field(command, args[1])?,
        })
    }
}

impl fmt::Display for FileLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FILE {} {}", self.name, self.size)
    }
}

/// Index Server answer to `GET`: `SERVER <ip> <port> <server_id> <size>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub ip: String,
    pub port: u16,
    pub server_id: String,
    pub size: u64,
}

impl Location {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (command, args) = tokens(line)?;
        if command != "SERVER" {
            return Err(ProtocolError::UnknownCommand(command.to_string()));
        }
        expect_args(command, &args, 4)?;
        Ok(Self {
            ip: args[0].to_string(),
            port: field(command, args[1])?,
            server_id: args[2].to_string(),
            size: field(command, args[3])?,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SERVER {} {} {} {}",
            self.ip, self.port, self.server_id, self.size
        )
    }
}

// ============================================================================
// INDEX SERVER REQUESTS
// ============================================================================

/// Everything the Index Server's shared port accepts, from clients and
/// from registering content servers alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRequest {
    Hello,
    Get { file_name: String },
    ListFiles,
    ListServers,
    Register {
        server_id: String,
        tcp_port: u16,
        udp_port: u16,
    },
    AddFile {
        server_id: String,
        file_name: String,
        size: u64,
    },
    DoneFiles,
    UpdateLoad { server_id: String, load: u32 },
}

impl IndexRequest {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (command, args) = tokens(line)?;
        match command {
            "HELLO" => Ok(IndexRequest::Hello),
            "GET" => {
                expect_args(command, &args, 1)?;
                Ok(IndexRequest::Get {
                    file_name: args[0].to_string(),
                })
            }
            "LIST_FILES" => Ok(IndexRequest::ListFiles),
            "LIST_SERVERS" => Ok(IndexRequest::ListServers),
            "REGISTER" => {
                expect_args(command, &args, 3)?;
                Ok(IndexRequest::Register {
                    server_id: args[0].to_string(),
                    tcp_port: field(command, args[1])?,
                    udp_port: field(command, args[2])?,
                })
            }
            "ADD_FILE" => {
                expect_args(command, &args, 3)?;
                Ok(IndexRequest::AddFile {
                    server_id: args[0].to_string(),
                    file_name: args[1].to_string(),
                    size: field(command, args[2])?,
                })
            }
            "DONE_FILES" => Ok(IndexRequest::DoneFiles),
            "UPDATE_LOAD" => {
                expect_args(command, &args, 2)?;
                Ok(IndexRequest::UpdateLoad {
                    server_id: args[0].to_string(),
                    load: field(command, args[1])?,
                })
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for IndexRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexRequest::Hello => write!(f, "HELLO"),
            IndexRequest::Get { file_name } => write!(f, "GET {}", file_name),
            IndexRequest::ListFiles => write!(f, "LIST_FILES"),
            IndexRequest::ListServers => write!(f, "LIST_SERVERS"),
            IndexRequest::Register {
                server_id,
                tcp_port,
                udp_port,
            } => write!(f, "REGISTER {} {} {}", server_id, tcp_port, udp_port),
            IndexRequest::AddFile {
                server_id,
                file_name,
                size,
            } => write!(f, "ADD_FILE {} {} {}", server_id, file_name, size),
            IndexRequest::DoneFiles => write!(f, "DONE_FILES"),
            IndexRequest::UpdateLoad { server_id, load } => {
                write!(f, "UPDATE_LOAD {} {}", server_id, load)
            }
        }
    }
}

/// True when the first line of a connection opens a content-server
/// registration session rather than a client query session.
pub fn opens_registration(line: &str) -> bool {
    line.split_whitespace().next() == Some("REGISTER")
}

// ============================================================================
// MONITOR REQUESTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorRequest {
    ListServers,
    RegisterIndex { ip: String, port: u16 },
    Ping,
}

impl MonitorRequest {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (command, args) = tokens(line)?;
        match command {
            "LIST_SERVERS" => Ok(MonitorRequest::ListServers),
            "REGISTER_INDEX" => {
                expect_args(command, &args, 2)?;
                Ok(MonitorRequest::RegisterIndex {
                    ip: args[0].to_string(),
                    port: field(command, args[1])?,
                })
            }
            "PING" => Ok(MonitorRequest::Ping),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for MonitorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorRequest::ListServers => write!(f, "LIST_SERVERS"),
            MonitorRequest::RegisterIndex { ip, port } => {
                write!(f, "REGISTER_INDEX {} {}", ip, port)
            }
            MonitorRequest::Ping => write!(f, "PING"),
        }
    }
}

/// UDP datagram `HEARTBEAT <id> <ip> <tcp_port> <load> <num_files>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    pub server_id: String,
    pub ip: String,
    pub tcp_port: u16,
    pub load: u32,
    pub num_files: u32,
}

impl Heartbeat {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (command, args) = tokens(line)?;
        if command != "HEARTBEAT" {
            return Err(ProtocolError::UnknownCommand(command.to_string()));
        }
        expect_args(command, &args, 5)?;
        Ok(Self {
            server_id: args[0].to_string(),
            ip: args[1].to_string(),
            tcp_port: field(command, args[2])?,
            load: field(command, args[3])?,
            num_files: field(command, args[4])?,
        })
    }
}

impl fmt::Display for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HEARTBEAT {} {} {} {} {}",
            self.server_id, self.ip, self.tcp_port, self.load, self.num_files
        )
    }
}

/// Failure notification `SERVER_DOWN <id> <unix_timestamp>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDown {
    pub server_id: String,
    pub timestamp: u64,
}

impl ServerDown {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (command, args) = tokens(line)?;
        if command != "SERVER_DOWN" {
            return Err(ProtocolError::UnknownCommand(command.to_string()));
        }
        expect_args(command, &args, 2)?;
        Ok(Self {
            server_id: args[0].to_string(),
            timestamp: field(command, args[1])?,
        })
    }
}

impl fmt::Display for ServerDown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SERVER_DOWN {} {}", self.server_id, self.timestamp)
    }
}

// ============================================================================
// CONTENT SERVER REQUESTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRequest {
    Get { file_name: String },
}

impl ContentRequest {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (command, args) = tokens(line)?;
        match command {
            "GET" => {
                expect_args(command, &args, 1)?;
                Ok(ContentRequest::Get {
                    file_name: args[0].to_string(),
                })
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for ContentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentRequest::Get { file_name } => write!(f, "GET {}", file_name),
        }
    }
}

/// Parse the `OK <size>` header that precedes a file's bytes.
pub fn parse_transfer_header(line: &str) -> Result<u64, ProtocolError> {
    let (command, args) = tokens(line)?;
    if command != "OK" {
        return Err(ProtocolError::UnknownCommand(command.to_string()));
    }
    expect_args(command, &args, 1)?;
    field(command, args[0])
}

/// Seconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
