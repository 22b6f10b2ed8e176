//! End-to-end decoding through the receiver front: pages in, records out.

use galileo_has::encode::{pages_from_message, Mt1Builder};
use galileo_has::message::{
    CellMask, CorrectionMask, GnssKind, HasMessage, OrbitCorrection, OrbitCorrections, SystemMask,
};
use galileo_has::reed_solomon::RsCodec;
use galileo_has::{HasMsgReceiver, HasPage, PAGE_BITS};

/// One Galileo system, PRN 10, signal 0, no explicit cell mask.
fn galileo_mask() -> CorrectionMask {
    CorrectionMask {
        systems: vec![SystemMask {
            gnss_id: GnssKind::GALILEO_ID,
            satellite_mask: 1 << 30,
            signal_mask: 1 << 15,
            cell_mask_availability: false,
            cell_mask: CellMask::filled(1, 1, true),
            nav_message: 1,
        }],
    }
}

fn mask_only_builder() -> Mt1Builder {
    Mt1Builder::new(12345 % 3600, 3, 1).with_mask(galileo_mask())
}

fn one_sat_orbit() -> OrbitCorrections {
    OrbitCorrections {
        validity_interval_index: 2,
        satellites: vec![OrbitCorrection {
            iod: 37,
            delta_radial: -1,
            delta_along_track: 5,
            delta_cross_track: -7,
        }],
    }
}

fn by_pid(pages: &[HasPage], page_id: u8) -> HasPage {
    pages
        .iter()
        .find(|p| p.page_id == page_id)
        .cloned()
        .unwrap_or_else(|| panic!("no page with pid {page_id}"))
}

fn assert_mask_only_record(record: &HasMessage) {
    assert_eq!(record.header.toh, 1545);
    assert_eq!(record.header.mask_id, 3);
    assert_eq!(record.header.iod_id, 1);
    assert!(record.header.mask_flag);

    let mask = record.mask.as_ref().expect("record should carry the mask");
    assert_eq!(mask.nsys(), 1);
    assert_eq!(mask.nsat_total(), 1);
    let sys = &mask.systems[0];
    assert_eq!(sys.gnss_id, GnssKind::GALILEO_ID);
    assert_eq!(sys.prns().collect::<Vec<_>>(), vec![10]);
    assert_eq!(sys.signals().collect::<Vec<_>>(), vec![0]);

    assert!(record.orbit.is_none());
    assert!(record.clock_fullset.is_none());
    assert!(record.clock_subset.is_none());
    assert!(record.code_bias.is_none());
    assert!(record.phase_bias.is_none());
    assert!(record.ura.is_none());
}

#[test]
fn decodes_with_exact_page_coverage() {
    let rs = RsCodec::new();
    let receiver = HasMsgReceiver::new();
    let corrections = receiver.corrections();

    let pages = mask_only_builder().pages(&rs, 5, 6);
    for pid in 1..=6 {
        receiver.handle_page(&by_pid(&pages, pid));
    }

    let record = corrections.try_recv().expect("one record expected");
    assert_mask_only_record(&record);
    assert!(corrections.try_recv().is_err(), "exactly one record");
}

#[test]
fn decodes_from_scattered_pages() {
    let rs = RsCodec::new();
    let pages = mask_only_builder().pages(&rs, 5, 6);

    let direct = HasMsgReceiver::new();
    let direct_rx = direct.corrections();
    for pid in 1..=6 {
        direct.handle_page(&by_pid(&pages, pid));
    }
    let expected = direct_rx.try_recv().unwrap();

    let scattered = HasMsgReceiver::new();
    let scattered_rx = scattered.corrections();
    for pid in [2, 4, 6, 40, 50, 60] {
        scattered.handle_page(&by_pid(&pages, pid));
    }
    assert_eq!(scattered_rx.try_recv().unwrap(), expected);
}

#[test]
fn decodes_from_parity_pages_alone() {
    let rs = RsCodec::new();
    let pages = mask_only_builder().pages(&rs, 5, 6);

    let receiver = HasMsgReceiver::new();
    let corrections = receiver.corrections();
    for pid in [40, 50, 60, 70, 80, 90] {
        receiver.handle_page(&by_pid(&pages, pid));
    }
    assert_mask_only_record(&corrections.try_recv().unwrap());
}

#[test]
fn correction_only_follow_up_uses_the_cached_mask() {
    let rs = RsCodec::new();
    let receiver = HasMsgReceiver::new();
    let corrections = receiver.corrections();

    let pages = mask_only_builder().pages(&rs, 5, 6);
    for pid in 1..=6 {
        receiver.handle_page(&by_pid(&pages, pid));
    }
    corrections.try_recv().expect("mask record");

    let follow_up = Mt1Builder::new(1600, 3, 1)
        .with_layout(galileo_mask())
        .with_orbit(one_sat_orbit())
        .pages(&rs, 6, 1);
    receiver.handle_page(&by_pid(&follow_up, 1));

    let record = corrections.try_recv().expect("correction record");
    assert!(!record.header.mask_flag);
    assert_eq!(record.mask.as_ref().unwrap(), &galileo_mask());
    let orbit = record.orbit.expect("orbit block");
    assert_eq!(orbit.satellites[0].delta_radial, -1);
    assert_eq!(orbit.satellites[0].delta_along_track, 5);
    assert_eq!(orbit.satellites[0].delta_cross_track, -7);
}

#[test]
fn dead_zone_pid_resets_the_slot() {
    let rs = RsCodec::new();
    let receiver = HasMsgReceiver::new();
    let corrections = receiver.corrections();

    let pages = Mt1Builder::new(1545, 3, 1)
        .with_mask(galileo_mask())
        .pages(&rs, 9, 2);

    // incomplete: nothing happens
    receiver.handle_page(&by_pid(&pages, 1));
    assert!(corrections.try_recv().is_err());

    // a corrupted page id in (message_size, 33) completes the count but makes
    // the codeword undeterminable; the slot must reset with no output
    let mut corrupted = by_pid(&pages, 2);
    corrupted.page_id = 5;
    receiver.handle_page(&corrupted);
    assert!(corrections.try_recv().is_err());

    // the message id is usable again after the reset
    receiver.handle_page(&by_pid(&pages, 1));
    receiver.handle_page(&by_pid(&pages, 2));
    let record = corrections.try_recv().expect("record after recovery");
    assert_eq!(record.header.mask_id, 3);
}

#[test]
fn correction_only_without_cached_mask_yields_nothing() {
    let rs = RsCodec::new();
    let receiver = HasMsgReceiver::new();
    let corrections = receiver.corrections();

    let pages = Mt1Builder::new(1600, 7, 0)
        .with_layout(galileo_mask())
        .with_orbit(one_sat_orbit())
        .pages(&rs, 2, 1);
    receiver.handle_page(&by_pid(&pages, 1));
    assert!(corrections.try_recv().is_err());
}

#[test]
fn out_of_range_toh_suppresses_output_and_evicts() {
    let rs = RsCodec::new();
    let receiver = HasMsgReceiver::new();
    let corrections = receiver.corrections();

    let pages = Mt1Builder::new(3700, 4, 0)
        .with_mask(galileo_mask())
        .pages(&rs, 1, 1);
    receiver.handle_page(&by_pid(&pages, 1));
    assert!(corrections.try_recv().is_err());

    // the mask was evicted, so referencing it later resolves nothing
    let follow_up = Mt1Builder::new(100, 4, 0)
        .with_layout(galileo_mask())
        .with_orbit(one_sat_orbit())
        .pages(&rs, 2, 1);
    receiver.handle_page(&by_pid(&follow_up, 1));
    assert!(corrections.try_recv().is_err());
}

#[test]
fn duplicate_pages_are_idempotent() {
    let rs = RsCodec::new();
    let receiver = HasMsgReceiver::new();
    let corrections = receiver.corrections();

    let pages = mask_only_builder().pages(&rs, 5, 2);
    receiver.handle_page(&by_pid(&pages, 1));
    receiver.handle_page(&by_pid(&pages, 1));
    assert!(corrections.try_recv().is_err());

    receiver.handle_page(&by_pid(&pages, 2));
    assert!(corrections.try_recv().is_ok());
}

#[test]
fn identical_mask_messages_decode_identically() {
    let rs = RsCodec::new();
    let receiver = HasMsgReceiver::new();
    let corrections = receiver.corrections();

    for message_id in [1, 2] {
        let pages = mask_only_builder().pages(&rs, message_id, 6);
        for pid in 1..=6 {
            receiver.handle_page(&by_pid(&pages, pid));
        }
    }
    let first = corrections.try_recv().unwrap();
    let second = corrections.try_recv().unwrap();
    assert_eq!(first, second);
}

#[test]
fn monitor_port_carries_the_raw_bits() {
    let rs = RsCodec::new();
    let receiver = HasMsgReceiver::new();
    receiver.set_enable_navdata_monitor(true);
    let monitor = receiver.nav_messages();

    let pages = mask_only_builder().pages(&rs, 5, 6);
    for pid in 1..=6 {
        let mut page = by_pid(&pages, pid);
        page.prn = 11;
        page.tow_ms = 345_600_000;
        receiver.handle_page(&page);
    }

    let packet = monitor.try_recv().expect("monitor packet");
    assert_eq!(packet.system, "E");
    assert_eq!(packet.signal, "E6");
    assert_eq!(packet.prn, 11);
    assert_eq!(packet.tow_at_current_symbol_ms, 345_600_000);
    assert_eq!(packet.nav_message.len(), 6 * PAGE_BITS);
}

#[test]
fn records_survive_an_encode_decode_round_trip() {
    let rs = RsCodec::new();
    let receiver = HasMsgReceiver::new();
    let corrections = receiver.corrections();

    let pages = Mt1Builder::new(900, 8, 3)
        .with_mask(galileo_mask())
        .with_orbit(one_sat_orbit())
        .pages(&rs, 3, 2);
    for pid in [1, 2] {
        receiver.handle_page(&by_pid(&pages, pid));
    }
    let original = corrections.try_recv().unwrap();

    // re-encode the parsed record and decode it on a fresh receiver
    let replayed = pages_from_message(&rs, &original, 3, 2);
    let second = HasMsgReceiver::new();
    let second_rx = second.corrections();
    for pid in [1, 2] {
        second.handle_page(&by_pid(&replayed, pid));
    }
    assert_eq!(second_rx.try_recv().unwrap(), original);
}
