use rstest::rstest;
use soc_can::{SimulatedSlave, TraceSample, VirtualBus, slave::END_SEQUENCE};
use soc_traits::frame::{CLASS_MASK, MessageClass};
use soc_traits::{Address, AddressFilter, Bus, NarrowFrame, WideFrame};

fn trace(rows: usize) -> Vec<TraceSample> {
    (0..rows)
        .map(|i| TraceSample {
            current: -(i as f32),
            voltage: 3.6 + 0.01 * i as f32,
            temperature: 25,
        })
        .collect()
}

/// Drive one handshake by hand and return the decoded `(index, current, voltage, temp)` tuples.
fn pull<B: Bus>(master: &mut B, addr: u8, channels: usize) -> Vec<(u32, f32, f32, i32)> {
    let cts = Address::clear_to_send(addr);
    master.bind(AddressFilter::exact(cts)).unwrap();
    master
        .send_narrow(&NarrowFrame::empty(Address::request_to_send(addr).pack()))
        .unwrap();
    let hs = master.recv_narrow().unwrap();
    assert_eq!(hs.len, 0);
    assert_eq!(hs.id, cts.pack());

    (0..channels)
        .map(|_| {
            let a = master.recv_narrow().unwrap();
            let b = master.recv_narrow().unwrap();
            (a.word32(0), a.f32_at(1), b.f32_at(0), b.i32_at(1))
        })
        .collect()
}

#[rstest]
#[case(1)]
#[case(4)]
fn slave_streams_every_channel_then_ends(#[case] channels: usize) {
    let bus = VirtualBus::new();
    let mut master = bus.node();
    let mut listener = bus.node();
    listener
        .bind(AddressFilter {
            id: Address::end_of_test(1).pack(),
            mask: CLASS_MASK,
        })
        .unwrap();

    let handle = SimulatedSlave::new(1, channels, trace(3)).spawn(bus.node());

    // bootstrap row: no balancing frame expected
    let first = pull(&mut master, 1, channels);
    assert_eq!(first.len(), channels);
    for (i, s) in first.iter().enumerate() {
        assert_eq!(s.0, i as u32);
        assert_eq!(s.1, 0.0);
        assert_eq!(s.3, 25);
    }

    for k in 1..3u64 {
        let rows = pull(&mut master, 1, channels);
        assert_eq!(rows[0].1, -(k as f32));
        master
            .send_wide(&WideFrame::new(Address::master_data(1).pack(), k))
            .unwrap();
    }

    let end = listener.recv_narrow().unwrap();
    assert_eq!(end.len, 2);
    assert_eq!(end.data[0], END_SEQUENCE);
    assert_eq!(
        Address::unpack(end.id).unwrap().class,
        MessageClass::End
    );

    let summary = handle.join().unwrap();
    assert_eq!(summary.rows_served, 3);
    assert_eq!(summary.masks, vec![1, 2]);
}

#[test]
fn slave_errors_out_when_master_disappears() {
    let bus = VirtualBus::new();
    let master = bus.node();
    let handle = SimulatedSlave::new(1, 1, trace(2)).spawn(bus.node());
    drop(master);
    assert!(handle.join().is_err());
}
