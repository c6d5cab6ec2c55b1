use ghosted_vector::algs::communicator::{CommTag, Communicator, RayonComm, Wait};
use serial_test::serial;

#[test]
#[serial]
fn rayon_round_trip() {
    let tag = CommTag::new(0x1000);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    c0.isend(1, tag.as_u16(), b"ghost");

    let mut buf = [0u8; 5];
    let got = c1.irecv(0, tag.as_u16(), &mut buf).wait().unwrap();
    assert_eq!(&got, b"ghost");
}

#[test]
#[serial]
fn rayon_fifo_order() {
    let tag = CommTag::new(0x1001);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    for i in 0..10u8 {
        c0.isend(1, tag.as_u16(), &[i]);
    }
    let out: Vec<u8> = (0..10)
        .map(|_| {
            let mut b = [0u8; 1];
            c1.irecv(0, tag.as_u16(), &mut b).wait().unwrap()[0]
        })
        .collect();
    assert_eq!(out, (0u8..10).collect::<Vec<_>>());
}

#[test]
#[serial]
fn truncation_keeps_prefix() {
    let tag = CommTag::new(0x1002);
    let c0 = RayonComm::new(0, 2);
    let c1 = RayonComm::new(1, 2);

    c0.isend(1, tag.as_u16(), &[1, 2, 3, 4, 5, 6]);
    let mut b = [0u8; 4];
    let got = c1.irecv(0, tag.as_u16(), &mut b).wait().unwrap();
    assert_eq!(got, vec![1, 2, 3, 4]);
}

#[test]
fn receive_blocks_until_the_message_arrives() {
    let tag = CommTag::new(0x1004);
    let comms = RayonComm::world(2);
    let (c0, c1) = (comms[0].clone(), comms[1].clone());
    let got = std::thread::scope(|s| {
        let rx = s.spawn(move || {
            let mut buf = [0u8; 3];
            c1.irecv(0, tag.as_u16(), &mut buf).wait()
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        c0.isend(1, tag.as_u16(), &[7, 8, 9]);
        rx.join().unwrap()
    });
    assert_eq!(got, Some(vec![7, 8, 9]));
}
