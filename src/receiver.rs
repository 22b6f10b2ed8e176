//! The HAS message receiver front: page intake, decode, and outbound ports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crossbeam::channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::message::{self, HasMessage, MaskCache};
use crate::page::{HasPage, PageSlot, MAX_MESSAGE_IDS, PAGE_BITS};
use crate::reed_solomon::{RsCodec, INFO_LEN};

/// Raw decoded navigation message bits for a navigation-data monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavMessagePacket {
    /// Constellation letter, `"E"` for Galileo.
    pub system: String,
    /// Signal name, `"E6"`.
    pub signal: String,
    /// PRN of the satellite whose page completed the message.
    pub prn: u16,
    pub tow_at_current_symbol_ms: u32,
    /// The reconstructed `message_size * 424` message bits.
    pub nav_message: String,
}

struct State {
    slots: Vec<Option<PageSlot>>,
    masks: MaskCache,
    rs: RsCodec,
}

/// Assembles HAS pages into correction records and publishes them.
///
/// Pages may be handed in from any thread; the handler serializes itself on
/// an internal mutex and never blocks on its outbound channels. Decoded
/// records are published on the [corrections](Self::corrections) port when
/// the mask they reference is known, and the raw bits go to the
/// [nav_messages](Self::nav_messages) port when the monitor is enabled.
///
/// Every failure is recovered locally: a bad message resets its accumulation
/// slot and the only outward symptom is the absence of a record.
pub struct HasMsgReceiver {
    state: Mutex<State>,
    corrections_tx: Sender<HasMessage>,
    corrections_rx: Receiver<HasMessage>,
    monitor_tx: Sender<NavMessagePacket>,
    monitor_rx: Receiver<NavMessagePacket>,
    monitor_enabled: AtomicBool,
}

impl HasMsgReceiver {
    #[must_use]
    pub fn new() -> Self {
        let (corrections_tx, corrections_rx) = unbounded();
        let (monitor_tx, monitor_rx) = unbounded();
        HasMsgReceiver {
            state: Mutex::new(State {
                slots: (0..MAX_MESSAGE_IDS).map(|_| None).collect(),
                masks: MaskCache::new(),
                rs: RsCodec::new(),
            }),
            corrections_tx,
            corrections_rx,
            monitor_tx,
            monitor_rx,
            monitor_enabled: AtomicBool::new(false),
        }
    }

    /// Outbound port carrying one [HasMessage] per successful decode whose
    /// mask resolves to at least one satellite.
    #[must_use]
    pub fn corrections(&self) -> Receiver<HasMessage> {
        self.corrections_rx.clone()
    }

    /// Outbound monitor port; quiet until enabled via
    /// [Self::set_enable_navdata_monitor].
    #[must_use]
    pub fn nav_messages(&self) -> Receiver<NavMessagePacket> {
        self.monitor_rx.clone()
    }

    pub fn set_enable_navdata_monitor(&self, enable: bool) {
        self.monitor_enabled.store(enable, Ordering::Relaxed);
    }

    /// Process one incoming page.
    ///
    /// Pages failing the screening rules (non-operational status, reserved
    /// page id, foreign message type, out-of-range ids, corrupt payload) are
    /// dropped without touching any state.
    pub fn handle_page(&self, page: &HasPage) {
        if page.status > 1 {
            debug!(status = page.status, "dropping page with non-operational HAS status");
            return;
        }
        if page.page_id == 0 {
            debug!("dropping page with reserved page id 0");
            return;
        }
        if page.message_type != 1 {
            debug!(message_type = page.message_type, "ignoring non-MT1 page");
            return;
        }
        if usize::from(page.message_id) >= MAX_MESSAGE_IDS {
            debug!(message_id = page.message_id, "dropping page with out-of-range message id");
            return;
        }
        if page.message_size == 0 || usize::from(page.message_size) > INFO_LEN {
            debug!(message_size = page.message_size, "dropping page with impossible message size");
            return;
        }
        if !payload_ok(&page.bits) {
            debug!(page_id = page.page_id, "dropping page with corrupt payload");
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let State { slots, masks, rs } = &mut *state;

        let slot = slots[usize::from(page.message_id)].get_or_insert_with(PageSlot::new);
        if !slot.insert(page.page_id, &page.bits) {
            debug!(
                message_id = page.message_id,
                page_id = page.page_id,
                "dropping duplicate page"
            );
            return;
        }
        debug!(
            status = page.status,
            message_id = page.message_id,
            message_size = page.message_size,
            page_id = page.page_id,
            "new HAS page"
        );

        if slot.len() != usize::from(page.message_size) {
            return;
        }

        let bits = match slot.reconstruct(rs, page.message_size) {
            Ok(bits) => bits,
            Err(err) => {
                warn!(
                    message_id = page.message_id,
                    received = ?slot.pids(),
                    %err,
                    "HAS message reconstruction failed"
                );
                slot.reset();
                return;
            }
        };
        slot.reset();

        if self.monitor_enabled.load(Ordering::Relaxed) {
            let packet = NavMessagePacket {
                system: "E".to_string(),
                signal: "E6".to_string(),
                prn: page.prn,
                tow_at_current_symbol_ms: page.tow_ms,
                nav_message: bits.clone(),
            };
            let _ = self.monitor_tx.send(packet);
        }

        let record = match message::parse(&bits, masks) {
            Ok(record) => record,
            Err(err) => {
                warn!(message_id = page.message_id, %err, "discarding malformed MT1 message");
                return;
            }
        };
        info!(
            message_id = page.message_id,
            mask_id = record.header.mask_id,
            "new HAS message received and successfully decoded"
        );

        if masks.nsat(record.header.mask_id) > 0 {
            let _ = self.corrections_tx.send(record);
        }
    }
}

impl Default for HasMsgReceiver {
    fn default() -> Self {
        Self::new()
    }
}

fn payload_ok(bits: &str) -> bool {
    bits.len() == PAGE_BITS && bits.bytes().all(|b| b == b'0' || b == b'1')
}
