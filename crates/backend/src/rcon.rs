// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal RCON (Valve Source) client
//!
//! Framed little-endian packets: `size(4) | id(4) | type(4) | body | 0 | 0`.
//! Only what a graceful game-server shutdown needs: authenticate, send one
//! command, tolerate the peer closing the socket as it exits.

use garcon_core::{Error, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Fixed connection timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const SERVERDATA_AUTH: i32 = 3;
const SERVERDATA_AUTH_RESPONSE: i32 = 2;
const SERVERDATA_EXECCOMMAND: i32 = 2;
const SERVERDATA_RESPONSE_VALUE: i32 = 0;

#[derive(Debug, PartialEq, Eq)]
struct Packet {
    id: i32,
    ptype: i32,
    body: String,
}

fn encode(id: i32, ptype: i32, body: &str) -> Vec<u8> {
    // body + null terminator + empty-string terminator
    let size = 4 + 4 + body.len() as i32 + 2;
    let mut out = Vec::with_capacity(size as usize + 4);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&ptype.to_le_bytes());
    out.extend_from_slice(body.as_bytes());
    out.extend_from_slice(&[0, 0]);
    out
}

/// Read one packet, reassembling partial frames from the socket.
async fn read_packet<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<Packet> {
    let mut size_buf = [0u8; 4];
    stream.read_exact(&mut size_buf).await?;
    let size = i32::from_le_bytes(size_buf);
    if !(10..=4096 + 10).contains(&size) {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("rcon frame size out of range: {size}"),
        ));
    }
    let mut frame = vec![0u8; size as usize];
    stream.read_exact(&mut frame).await?;
    let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    let ptype = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
    let body = String::from_utf8_lossy(&frame[8..size as usize - 2]).into_owned();
    Ok(Packet { id, ptype, body })
}

/// RCON connection in an authenticated or pre-auth state.
pub struct RconClient<S = TcpStream> {
    stream: S,
    next_id: i32,
}

impl RconClient<TcpStream> {
    /// Connect with the fixed timeout.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::NativeProcess(format!("rcon connect to {addr} timed out")))?
            .map_err(|e| Error::NativeProcess(format!("rcon connect to {addr}: {e}")))?;
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> RconClient<S> {
    /// Wrap an established stream (tests use in-memory pipes).
    pub fn new(stream: S) -> Self {
        Self { stream, next_id: 0 }
    }

    fn fresh_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    /// Type-3 auth handshake. A response id of `-1` means bad password.
    pub async fn authenticate(&mut self, password: &str) -> Result<()> {
        let id = self.fresh_id();
        self.stream
            .write_all(&encode(id, SERVERDATA_AUTH, password))
            .await
            .map_err(|e| Error::NativeProcess(format!("rcon auth write: {e}")))?;

        // Some servers send an empty RESPONSE_VALUE before the auth response.
        loop {
            let packet = read_packet(&mut self.stream)
                .await
                .map_err(|e| Error::NativeProcess(format!("rcon auth read: {e}")))?;
            if packet.ptype == SERVERDATA_AUTH_RESPONSE {
                if packet.id == -1 {
                    return Err(Error::NativeProcess("rcon authentication failed".into()));
                }
                return Ok(());
            }
        }
    }

    /// Send a type-2 command and wait for the matching type-0 response.
    pub async fn command(&mut self, cmd: &str) -> Result<String> {
        let id = self.fresh_id();
        self.stream
            .write_all(&encode(id, SERVERDATA_EXECCOMMAND, cmd))
            .await
            .map_err(|e| Error::NativeProcess(format!("rcon command write: {e}")))?;

        loop {
            let packet = read_packet(&mut self.stream)
                .await
                .map_err(|e| Error::NativeProcess(format!("rcon command read: {e}")))?;
            if packet.ptype == SERVERDATA_RESPONSE_VALUE && packet.id == id {
                return Ok(packet.body);
            }
        }
    }

    /// Shutdown-style command: the game may close the socket as it exits, so
    /// any I/O failure after successful auth counts as delivered.
    pub async fn send_shutdown(&mut self, password: &str, cmd: &str) -> Result<()> {
        self.authenticate(password).await?;
        match self.command(cmd).await {
            Ok(_) => Ok(()),
            Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "rcon_tests.rs"]
mod tests;
