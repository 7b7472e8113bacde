//! Collaborator contracts and event types
//!
//! The control-plane core has no wire format of its own. Its boundary is a
//! set of call/event contracts:
//!
//! - **Inbound events** produced by the lower layers (cell-search result,
//!   cell-select result, SIB decode, config-applied confirmation, mobility
//!   command) are plain structs fed into the engine.
//! - **Outbound calls** are issued through [`RadioInterface`] and
//!   [`StackInterface`]. Messages cross the boundary as structured fields;
//!   bit-level encoding is the collaborator's job.
//! - **Indications** flow to the upper layer as [`RrcIndication`] values
//!   drained from the engine's queue, so the triggering layer is never
//!   re-entered synchronously.

use std::fmt;

use bytes::Bytes;

use crate::cell::CellIdentity;

/// Logical channel id of the common control channel (setup request).
pub const LCID_SRB0: u32 = 0;
/// Logical channel id of the dedicated control channel.
pub const LCID_SRB1: u32 = 1;

/// Cause of a connection establishment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstablishmentCause {
    Emergency,
    HighPriorityAccess,
    MtAccess,
    MoSignalling,
    MoData,
    MoVoiceCall,
    MoSms,
}

impl fmt::Display for EstablishmentCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstablishmentCause::Emergency => write!(f, "emergency"),
            EstablishmentCause::HighPriorityAccess => write!(f, "highPriorityAccess"),
            EstablishmentCause::MtAccess => write!(f, "mt-Access"),
            EstablishmentCause::MoSignalling => write!(f, "mo-Signalling"),
            EstablishmentCause::MoData => write!(f, "mo-Data"),
            EstablishmentCause::MoVoiceCall => write!(f, "mo-VoiceCall"),
            EstablishmentCause::MoSms => write!(f, "mo-SMS"),
        }
    }
}

/// Decoded summary of the broadcast fragment captured during cell search.
#[derive(Debug, Clone, Copy, Default)]
pub struct MibSummary {
    /// True when the cell bars new connections
    pub barred: bool,
    /// True when the broadcast configuration uses parameters this UE supports
    pub supported_config: bool,
}

/// Result of an asynchronous cell search.
#[derive(Debug, Clone)]
pub struct CellSearchResult {
    /// False when no cell was detected on the carrier
    pub found: bool,
    /// Identity of the detected cell; meaningless when `found` is false
    pub identity: CellIdentity,
    /// Measured RSRP (dBm)
    pub rsrp_dbm: f32,
    /// Measured RSRQ (dB)
    pub rsrq_db: f32,
    /// Measured carrier frequency offset (Hz)
    pub cfo_hz: f32,
    /// Decoded broadcast summary; None when the fragment could not be decoded
    pub mib: Option<MibSummary>,
}

impl CellSearchResult {
    /// A "nothing found" result.
    pub fn not_found() -> Self {
        Self {
            found: false,
            identity: CellIdentity::default(),
            rsrp_dbm: f32::NAN,
            rsrq_db: f32::NAN,
            cfo_hz: 0.0,
            mib: None,
        }
    }
}

/// Result of an asynchronous cell select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellSelectStatus {
    Success,
    Failure,
}

/// Arguments for starting a cell search.
#[derive(Debug, Clone, Copy)]
pub struct CellSearchArgs {
    /// Carrier to search on
    pub earfcn: u32,
}

/// Physical-layer configuration derived from a search result.
#[derive(Debug, Clone, Copy)]
pub struct PhyConfig {
    /// Cell the configuration targets
    pub identity: CellIdentity,
    /// Frequency offset compensation to apply
    pub cfo_hz: f32,
}

/// Cell-group configuration, pre-decoded by the codec collaborator.
#[derive(Debug, Clone, Default)]
pub struct CellGroupConfig {
    /// True when applying this configuration requires lower-layer
    /// resynchronisation; completion must then wait for confirmation
    pub with_sync: bool,
    /// Opaque configuration body consumed by the lower layers
    pub config: Bytes,
}

/// Radio-bearer configuration, pre-decoded by the codec collaborator.
#[derive(Debug, Clone, Default)]
pub struct RadioBearerConfig {
    /// Opaque configuration body consumed by the lower layers
    pub config: Bytes,
}

/// Fields of a downlink connection-setup message.
#[derive(Debug, Clone)]
pub struct ConnectionSetupRequest {
    /// Transaction id echoed in the completion message
    pub transaction_id: u8,
    /// Cell-group configuration to apply
    pub cell_group: CellGroupConfig,
    /// Radio-bearer configuration to apply
    pub radio_bearer: RadioBearerConfig,
}

/// Fields of a downlink connection-reconfiguration message.
#[derive(Debug, Clone, Default)]
pub struct ReconfigurationRequest {
    /// Transaction id echoed in the completion message
    pub transaction_id: u8,
    /// Optional secondary cell-group configuration, applied first
    pub secondary_cell_group: Option<CellGroupConfig>,
    /// Optional security-key refresh parameter
    pub sk_counter: Option<u32>,
    /// Optional master cell-group configuration
    pub master_cell_group: Option<CellGroupConfig>,
    /// Optional radio-bearer configuration, applied last
    pub radio_bearer: Option<RadioBearerConfig>,
    /// Piggy-backed upper-layer payloads, forwarded one-by-one
    pub payloads: Vec<Bytes>,
}

/// Uplink messages sent by procedures. Fields only; encoding is external.
#[derive(Debug, Clone)]
pub enum UplinkMessage {
    /// Connection establishment request
    SetupRequest {
        /// Random 39-bit UE identity
        ue_identity: u64,
        /// Establishment cause
        cause: EstablishmentCause,
    },
    /// Connection setup completion, carrying the held dedicated payload
    SetupComplete {
        /// Transaction id from the setup message
        transaction_id: u8,
        /// Dedicated upper-layer payload
        payload: Bytes,
    },
    /// Reconfiguration completion
    ReconfigurationComplete {
        /// Transaction id from the reconfiguration message
        transaction_id: u8,
    },
}

/// Notifications queued for the upper layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RrcIndication {
    /// The connection attempt completed and the UE is connected
    ConnectionEstablished,
    /// The connection attempt failed (rejection, timeout, or selection error)
    ConnectionFailed,
    /// The connection was released locally
    ConnectionReleased,
    /// A reconfiguration was applied and acknowledged
    ReconfigurationApplied,
    /// A reconfiguration was rejected by the lower layers
    ReconfigurationFailed,
    /// A piggy-backed upper-layer payload was received
    UpperLayerPayload(Bytes),
    /// A failure report has been captured and is ready for transmission
    FailureReportAvailable,
}

/// Physical-layer collaborator: acquisition and configuration.
///
/// `start_cell_search` and `start_cell_select` return whether the request
/// was accepted; their results arrive later as inbound events.
pub trait RadioInterface {
    /// Begins an asynchronous cell search on a carrier.
    fn start_cell_search(&mut self, args: &CellSearchArgs) -> bool;
    /// Begins an asynchronous camp attempt on a specific cell.
    fn start_cell_select(&mut self, identity: CellIdentity) -> bool;
    /// Applies a derived physical-layer configuration.
    fn apply_phy_config(&mut self, config: &PhyConfig) -> bool;
}

/// Stack-side collaborator: configuration sinks and the message channel.
pub trait StackInterface {
    /// Applies a cell-group configuration; false on rejection.
    fn apply_cell_group_config(&mut self, config: &CellGroupConfig) -> bool;
    /// Applies a radio-bearer configuration; false on rejection.
    fn apply_radio_bearer_config(&mut self, config: &RadioBearerConfig) -> bool;
    /// Refreshes the security keys from the given parameter; false on failure.
    fn refresh_security_keys(&mut self, sk_counter: u32) -> bool;
    /// Sends a message on the given logical channel. Fire-and-forget.
    fn send_message(&mut self, lcid: u32, msg: UplinkMessage);
}
