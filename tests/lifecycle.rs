use ghosted_vector::prelude::*;

mod util;
use util::run_ranks;

fn serial(values: &[f64]) -> Vector<f64, NoComm> {
    let mut v = Vector::with_size(NoComm, values.len(), values.len(), ParallelType::Serial)
        .expect("serial init");
    v.assign_from_slice(values).unwrap();
    v.close().unwrap();
    v
}

#[test]
fn serial_scenario() {
    let mut v = Vector::<f64, _>::new(NoComm);
    v.init(10, 10, false, ParallelType::Serial).unwrap();
    v.set(3, 7.5).unwrap();
    v.close().unwrap();

    assert_eq!(v.get(3).unwrap(), 7.5);
    let all = v.get_many(&(0..10).collect::<Vec<_>>()).unwrap();
    assert_eq!(all.iter().filter(|&&x| x == 0.0).count(), 9);
    assert_eq!(v.min().unwrap(), 0.0);
    assert_eq!(v.max().unwrap(), 7.5);
}

#[test]
fn clone_is_independent() {
    let v = serial(&[1.0, 2.0, 3.0]);
    let mut w = v.try_clone().unwrap();
    assert!(w.closed());
    assert_eq!(w.localize().unwrap(), vec![1.0, 2.0, 3.0]);

    w.set(0, 100.0).unwrap();
    w.close().unwrap();
    assert_eq!(v.get(0).unwrap(), 1.0);
    assert_eq!(w.get(0).unwrap(), 100.0);
}

#[test]
fn zero_clone_has_shape_and_zeros() {
    let v = serial(&[4.0, 5.0]);
    let z = v.zero_clone().unwrap();
    assert_eq!(z.size(), 2);
    assert_eq!(z.storage_type(), Some(StorageType::Serial));
    assert_eq!(z.l1_norm().unwrap(), 0.0);
    assert_eq!(v.sum().unwrap(), 9.0);
}

#[test]
fn close_is_idempotent() {
    let mut v = serial(&[1.0, -1.0, 2.0]);
    let before = v.localize().unwrap();
    v.close().unwrap();
    v.close().unwrap();
    assert_eq!(v.localize().unwrap(), before);
}

#[test]
fn ghosted_close_is_idempotent() {
    let out = run_ranks(2, |c| {
        let me = c.rank();
        let ghosts: &[usize] = if me == 0 { &[3] } else { &[0] };
        let mut v = Vector::<f64, _>::with_ghosts(c, 4, 2, ghosts, ParallelType::Ghosted).unwrap();
        for i in v.first_local_index()..v.last_local_index() {
            v.set(i, 1.5 * i as f64 + 1.0).unwrap();
        }
        let wanted = [v.first_local_index(), v.last_local_index() - 1, ghosts[0]];
        v.close().unwrap();
        let first = v.get_many(&wanted).unwrap();
        v.close().unwrap();
        (first, v.get_many(&wanted).unwrap())
    });
    assert_eq!(out[0].0, vec![1.0, 2.5, 5.5]);
    assert_eq!(out[1].0, vec![4.0, 5.5, 1.0]);
    for (first, second) in out {
        assert_eq!(first, second);
    }
}

#[test]
fn clone_carries_pending_off_process_writes() {
    let out = run_ranks(2, |c| {
        let me = c.rank();
        let mut v = Vector::<f64, _>::with_size(c, 2, 1, ParallelType::Parallel).unwrap();
        if me == 0 {
            v.add(1, 5.0).unwrap();
        }
        let mut w = v.try_clone().unwrap();
        v.close().unwrap();
        w.close().unwrap();
        let i = v.first_local_index();
        (v.get(i).unwrap(), w.get(i).unwrap())
    });
    assert_eq!(out[0], (0.0, 0.0));
    assert_eq!(out[1], (5.0, 5.0));
}

#[test]
fn swap_twice_is_identity() {
    let mut a = serial(&[1.0, 2.0]);
    let mut b = serial(&[7.0, 8.0, 9.0]);
    a.swap(&mut b);
    assert_eq!(a.size(), 3);
    assert_eq!(b.localize().unwrap(), vec![1.0, 2.0]);
    a.swap(&mut b);
    assert_eq!(a.localize().unwrap(), vec![1.0, 2.0]);
    assert_eq!(b.localize().unwrap(), vec![7.0, 8.0, 9.0]);
}

#[test]
fn swap_carries_ownership_tag() {
    let owned = serial(&[1.0]);
    let raw = RawVec::<f64, _>::create_serial(NoComm, VectorCommTags::default(), 1);
    let mut wrapped = Vector::from_raw(raw.handle());
    let mut owned = owned;
    owned.swap(&mut wrapped);
    assert!(!owned.owns_storage());
    assert!(wrapped.owns_storage());
    owned.clear();
    assert!(!raw.is_destroyed());
}

#[test]
fn wrapped_storage_survives_clear() {
    let raw = RawVec::<f64, _>::create_serial(NoComm, VectorCommTags::default(), 2);
    raw.set_value(1, 3.0, InsertMode::Insert).unwrap();
    {
        let mut v = Vector::from_raw(raw.handle());
        assert_eq!(v.state(), VectorState::Closed);
        assert!(!v.owns_storage());
        assert_eq!(v.get(1).unwrap(), 3.0);
        v.clear();
        assert_eq!(v.state(), VectorState::Uninitialized);
    }
    assert!(!raw.is_destroyed());
    assert_eq!(raw.get_values(&[1]).unwrap(), vec![3.0]);
}

#[test]
fn owned_storage_is_destroyed_on_drop() {
    let v = serial(&[1.0]);
    let handle = v.raw().unwrap().handle();
    drop(v);
    assert!(handle.is_destroyed());
}

#[test]
fn init_like_copies_shape_not_values() {
    let out = run_ranks(2, |c| {
        let ghosts: &[usize] = if c.rank() == 0 { &[2] } else { &[0] };
        let mut v =
            Vector::<f64, _>::with_ghosts(c.clone(), 4, 2, ghosts, ParallelType::Ghosted).unwrap();
        v.assign_scalar(1.0).unwrap();
        v.close().unwrap();

        let mut w = Vector::<f64, _>::new(c);
        w.init_like(&v, false).unwrap();
        (
            w.storage_type(),
            w.ghost_indices().to_vec(),
            w.first_local_index(),
            w.get_many(&[w.first_local_index(), w.ghost_indices()[0]]).unwrap(),
        )
    });
    assert_eq!(out[0], (Some(StorageType::Ghosted), vec![2], 0, vec![0.0, 0.0]));
    assert_eq!(out[1], (Some(StorageType::Ghosted), vec![0], 2, vec![0.0, 0.0]));
}

#[test]
fn clear_then_reinit() {
    let mut v = serial(&[1.0, 2.0]);
    v.clear();
    assert!(!v.initialized());
    assert_eq!(v.size(), 0);
    v.init_global(3, false, ParallelType::Automatic).unwrap();
    assert_eq!(v.storage_type(), Some(StorageType::Serial));
    v.close().unwrap();
    assert_eq!(v.sum().unwrap(), 0.0);
}
