// End-of-test listener over the virtual bus.
use soc_can::VirtualBus;
use soc_core::{EndListener, ShutdownFlag, SocError, await_end_of_test};
use soc_traits::{Address, Bus, NarrowFrame};

fn end_frame(slave: u8, seq: u16) -> NarrowFrame {
    let mut f = NarrowFrame::empty(Address::end_of_test(slave).pack());
    f.len = 2;
    f.data[0] = seq;
    f
}

#[test]
fn raises_flag_on_own_slave_end_frame() {
    let bus = VirtualBus::new();
    let listener_node = bus.node();
    let mut tx = bus.node();
    let flag = ShutdownFlag::new();

    let listener = EndListener::spawn(listener_node, 1, flag.clone());
    // Another slave's end frame and ordinary traffic are ignored
    tx.send_narrow(&end_frame(2, 7)).unwrap();
    tx.send_narrow(&NarrowFrame::empty(Address::clear_to_send(1).pack()))
        .unwrap();
    tx.send_narrow(&end_frame(1, 0x400)).unwrap();

    assert_eq!(listener.join().unwrap(), 0x400);
    assert!(flag.is_raised());
}

#[test]
fn bus_loss_is_reported_without_raising() {
    let bus = VirtualBus::new();
    let mut node = bus.node();
    let peer = bus.node();
    drop(peer);

    let flag = ShutdownFlag::new();
    let err = await_end_of_test(&mut node, 1, &flag).unwrap_err();
    assert!(matches!(err.downcast_ref::<SocError>(), Some(SocError::Bus(_))));
    assert!(!flag.is_raised());
}
