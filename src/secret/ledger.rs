//! Hardware wallet secret manager speaking APDUs
//!
//! Frames on the simulator socket are a 4-byte big-endian length followed
//! by the APDU; answers carry the same length prefix, the data and a 2-byte
//! status word. Exchanges wait for the device without a timeout because the
//! user confirms on the device. Only the TCP simulator transport is built in.

use super::types::{Chain, GenerateAddressOptions, LedgerApp, LedgerNanoStatus};
use super::SecretManage;
use crate::block::payload::SignatureUnlock;
use crate::block::Address;
use crate::error::{Error, Result};
use async_trait::async_trait;
use secp256k1::constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE};
use std::ops::Range;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

pub const SIMULATOR_ADDRESS: &str = "127.0.0.1:9999";

pub const CLA: u8 = 0x7b;
pub const INS_GET_APP_CONFIG: u8 = 0x10;
pub const INS_GET_PUBLIC_KEY: u8 = 0x11;
pub const INS_SIGN: u8 = 0x12;

pub const SW_OK: u16 = 0x9000;
pub const SW_DENIED: u16 = 0x6985;
pub const SW_LOCKED: u16 = 0x5515;

const APP_NAME: &str = "Trinity";

/// Largest answer accepted from the simulator socket.
pub const MAX_ANSWER_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl ApduCommand {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let len = u8::try_from(self.data.len())
            .map_err(|_| Error::Ledger(format!("apdu payload too long: {} bytes", self.data.len())))?;
        let mut bytes = vec![CLA, self.ins, self.p1, self.p2, len];
        bytes.extend_from_slice(&self.data);
        Ok(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduAnswer {
    pub data: Vec<u8>,
    pub status: u16,
}

impl ApduAnswer {
    fn into_data(self) -> Result<Vec<u8>> {
        match self.status {
            SW_OK => Ok(self.data),
            SW_DENIED => Err(Error::LedgerDenied),
            SW_LOCKED => Err(Error::Ledger("device is locked".to_string())),
            status => Err(Error::Ledger(format!("device returned status {:#06x}", status))),
        }
    }
}

#[async_trait]
pub trait ApduTransport: Send + Sync {
    async fn exchange(&self, command: &ApduCommand) -> Result<ApduAnswer>;
}

/// Transport to the device simulator over TCP.
#[derive(Debug, Clone)]
pub struct TcpApduTransport {
    address: String,
}

impl TcpApduTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl ApduTransport for TcpApduTransport {
    async fn exchange(&self, command: &ApduCommand) -> Result<ApduAnswer> {
        let apdu = command.to_bytes()?;
        let mut stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| Error::Ledger(format!("cannot reach device at {}: {}", self.address, e)))?;
        stream.write_all(&(apdu.len() as u32).to_be_bytes()).await?;
        stream.write_all(&apdu).await?;

        let len = stream.read_u32().await? as usize;
        if len > MAX_ANSWER_LEN {
            return Err(Error::Ledger(format!(
                "device answer of {} bytes exceeds {} bytes",
                len, MAX_ANSWER_LEN
            )));
        }
        let mut data = vec![0u8; len];
        stream.read_exact(&mut data).await?;
        let status = stream.read_u16().await?;
        debug!(ins = command.ins, status, "apdu exchanged");
        Ok(ApduAnswer { data, status })
    }
}

/// Stand-in for the USB HID transport, which this build does not ship.
#[derive(Debug, Clone, Copy)]
struct HidUnavailable;

#[async_trait]
impl ApduTransport for HidUnavailable {
    async fn exchange(&self, _command: &ApduCommand) -> Result<ApduAnswer> {
        Err(Error::Ledger(
            "hardware device transport is not available, use the simulator".to_string(),
        ))
    }
}

pub struct LedgerSecretManager {
    pub is_simulator: bool,
    transport: Box<dyn ApduTransport>,
    /// One exchange sequence at a time per device.
    lock: Mutex<()>,
}

impl core::fmt::Debug for LedgerSecretManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LedgerSecretManager")
            .field("is_simulator", &self.is_simulator)
            .finish_non_exhaustive()
    }
}

fn chain_bytes(chain: &Chain) -> Vec<u8> {
    chain.segments().iter().flat_map(|s| s.to_be_bytes()).collect()
}

impl LedgerSecretManager {
    pub fn new(is_simulator: bool) -> Self {
        let transport: Box<dyn ApduTransport> = if is_simulator {
            Box::new(TcpApduTransport::new(SIMULATOR_ADDRESS))
        } else {
            Box::new(HidUnavailable)
        };
        Self::with_transport(is_simulator, transport)
    }

    pub fn with_transport(is_simulator: bool, transport: Box<dyn ApduTransport>) -> Self {
        Self {
            is_simulator,
            transport,
            lock: Mutex::new(()),
        }
    }

    /// Never fails: an unreachable device reports `connected: false`.
    pub async fn get_ledger_nano_status(&self) -> LedgerNanoStatus {
        let _guard = self.lock.lock().await;
        let command = ApduCommand {
            ins: INS_GET_APP_CONFIG,
            p1: 0,
            p2: 0,
            data: Vec::new(),
        };
        match self.transport.exchange(&command).await {
            Ok(answer) if answer.status == SW_LOCKED => LedgerNanoStatus {
                connected: true,
                locked: true,
                app: None,
                buffer_size: None,
            },
            Ok(ApduAnswer { data, status: SW_OK }) if data.len() >= 6 => LedgerNanoStatus {
                connected: true,
                locked: data[3] & 1 == 1,
                app: Some(LedgerApp {
                    name: APP_NAME.to_string(),
                    version: format!("{}.{}.{}", data[0], data[1], data[2]),
                }),
                buffer_size: Some(u16::from_be_bytes([data[4], data[5]]) as usize),
            },
            Ok(answer) => {
                debug!(status = answer.status, "unexpected app config answer");
                LedgerNanoStatus {
                    connected: true,
                    locked: false,
                    app: None,
                    buffer_size: None,
                }
            }
            Err(e) => {
                debug!(error = %e, "ledger not reachable");
                LedgerNanoStatus {
                    connected: false,
                    locked: false,
                    app: None,
                    buffer_size: None,
                }
            }
        }
    }

    async fn public_key(&self, chain: &Chain, prompt: bool) -> Result<[u8; PUBLIC_KEY_SIZE]> {
        let answer = self
            .transport
            .exchange(&ApduCommand {
                ins: INS_GET_PUBLIC_KEY,
                p1: prompt as u8,
                p2: 0,
                data: chain_bytes(chain),
            })
            .await?
            .into_data()?;
        answer
            .as_slice()
            .try_into()
            .map_err(|_| Error::Ledger(format!("public key answer has {} bytes", answer.len())))
    }
}

#[async_trait]
impl SecretManage for LedgerSecretManager {
    async fn generate_addresses(
        &self,
        coin_type: u32,
        account_index: u32,
        range: Range<u32>,
        internal: bool,
        options: Option<GenerateAddressOptions>,
    ) -> Result<Vec<Address>> {
        let prompt = options.map_or(false, |o| o.ledger_nano_prompt);
        let _guard = self.lock.lock().await;
        let mut addresses = Vec::with_capacity(range.len());
        for index in range {
            let chain = Chain::new(coin_type, account_index, internal, index);
            let bytes = self.public_key(&chain, prompt).await?;
            let public_key = secp256k1::PublicKey::from_slice(&bytes)?;
            addresses.push(Address::from_public_key(&public_key));
        }
        Ok(addresses)
    }

    async fn sign(&self, message: &[u8], chain: &Chain) -> Result<SignatureUnlock> {
        let _guard = self.lock.lock().await;
        let mut data = chain_bytes(chain);
        data.extend_from_slice(message);
        let answer = self
            .transport
            .exchange(&ApduCommand {
                ins: INS_SIGN,
                p1: 0,
                p2: 0,
                data,
            })
            .await?
            .into_data()?;
        if answer.len() != PUBLIC_KEY_SIZE + COMPACT_SIGNATURE_SIZE {
            return Err(Error::Ledger(format!("signature answer has {} bytes", answer.len())));
        }
        let mut public_key = [0u8; PUBLIC_KEY_SIZE];
        let mut signature = [0u8; COMPACT_SIGNATURE_SIZE];
        public_key.copy_from_slice(&answer[..PUBLIC_KEY_SIZE]);
        signature.copy_from_slice(&answer[PUBLIC_KEY_SIZE..]);
        Ok(SignatureUnlock {
            public_key,
            signature,
        })
    }
}
