use ghosted_vector::prelude::*;

mod util;
use util::run_ranks;

#[test]
fn two_rank_ghost_refresh() {
    // rank 0 owns {0,1} and ghosts {2}; rank 1 owns {2,3} and ghosts {1}
    let out = run_ranks(2, |c| {
        let me = c.rank();
        let ghosts: &[usize] = if me == 0 { &[2] } else { &[1] };
        let mut v = Vector::<f64, _>::with_ghosts(c, 4, 2, ghosts, ParallelType::Ghosted).unwrap();
        if me == 0 {
            v.set(1, 5.0).unwrap();
        } else {
            v.set(2, 9.0).unwrap();
        }
        v.close().unwrap();
        v.get(ghosts[0]).unwrap()
    });
    assert_eq!(out, vec![9.0, 5.0]);
}

#[test]
fn off_process_adds_accumulate_and_inserts_follow_rank_order() {
    let out = run_ranks(3, |c| {
        let me = c.rank();
        // every rank ghosts the entries it does not own
        let ghosts: Vec<usize> = (0..3).filter(|&g| g != me).collect();
        let mut v =
            Vector::<f64, _>::with_ghosts(c, 3, 1, &ghosts, ParallelType::Automatic).unwrap();
        v.add(0, 1.0 + me as f64).unwrap();
        if me != 1 {
            v.set(1, 10.0 * (me as f64 + 1.0)).unwrap();
        }
        v.close().unwrap();
        v.get_many(&[0, 1, 2]).unwrap()
    });
    for row in &out {
        assert_eq!(row, &vec![6.0, 30.0, 0.0]);
    }
}

#[test]
fn map_global_to_local_contract() {
    let out = run_ranks(2, |c| {
        let me = c.rank();
        let ghosts: &[usize] = if me == 0 { &[5, 3] } else { &[0] };
        let v = Vector::<f64, _>::with_ghosts(c, 6, 3, ghosts, ParallelType::Ghosted).unwrap();
        let first = v.first_local_index();
        let owned: Vec<usize> = (first..first + 3)
            .map(|i| v.map_global_to_local(i))
            .collect();
        let ghost_offsets: Vec<usize> = ghosts
            .iter()
            .map(|&g| v.map_global_to_local(g))
            .collect();
        let missing = v.try_map_global_to_local(if me == 0 { 4 } else { 1 });
        (owned, ghost_offsets, missing)
    });
    assert_eq!(out[0].0, vec![0, 1, 2]);
    assert_eq!(out[0].1, vec![3, 4]);
    assert_eq!(
        out[0].2,
        Err(VectorError::IndexNotLocal {
            index: 4,
            first: 0,
            last: 3,
            ghosts: vec![5, 3]
        })
    );
    assert_eq!(out[1].0, vec![0, 1, 2]);
    assert_eq!(out[1].1, vec![3]);
    assert!(out[1].2.is_err());
}

#[test]
fn ghost_reads_reflect_latest_close() {
    let out = run_ranks(2, |c| {
        let me = c.rank();
        let ghosts: &[usize] = if me == 0 { &[3] } else { &[0] };
        let mut v = Vector::<f64, _>::with_ghosts(c, 4, 2, ghosts, ParallelType::Ghosted).unwrap();
        let mut seen = Vec::new();
        for round in 1..=3 {
            let owned = v.first_local_index()..v.last_local_index();
            for i in owned {
                v.set(i, (round * 10 + i) as f64).unwrap();
            }
            v.close().unwrap();
            seen.push(v.get(ghosts[0]).unwrap());
        }
        seen
    });
    assert_eq!(out[0], vec![13.0, 23.0, 33.0]);
    assert_eq!(out[1], vec![10.0, 20.0, 30.0]);
}

#[test]
fn zero_clears_ghost_slots_without_communication() {
    let out = run_ranks(2, |c| {
        let me = c.rank();
        let ghosts: &[usize] = if me == 0 { &[2] } else { &[1] };
        let mut v = Vector::<f64, _>::with_ghosts(c, 4, 2, ghosts, ParallelType::Ghosted).unwrap();
        v.assign_scalar(2.0).unwrap();
        v.close().unwrap();
        v.zero().unwrap();
        v.get(ghosts[0]).unwrap()
    });
    assert_eq!(out, vec![0.0, 0.0]);
}

#[test]
fn size_mismatch_fails_on_every_rank() {
    let out = run_ranks(2, |c| {
        let n_local = if c.rank() == 0 { 2 } else { 1 };
        Vector::<f64, _>::with_size(c, 4, n_local, ParallelType::Parallel).map(|_| ())
    });
    for r in out {
        assert_eq!(r, Err(VectorError::GlobalSizeMismatch { global: 4, sum: 3 }));
    }
}

#[test]
fn disagreeing_global_sizes_fail_on_every_rank() {
    let out = run_ranks(2, |c| {
        let n = 4 + c.rank();
        Vector::<f64, _>::with_size(c, n, 2, ParallelType::Parallel).map(|_| ())
    });
    assert_eq!(
        out[0],
        Err(VectorError::InconsistentGlobalSize {
            rank: 1,
            global: 4,
            theirs: 5
        })
    );
    assert_eq!(
        out[1],
        Err(VectorError::InconsistentGlobalSize {
            rank: 0,
            global: 5,
            theirs: 4
        })
    );
}

#[test]
fn closing_vectors_in_different_orders_is_reported() {
    let out = run_ranks(2, |c| {
        let me = c.rank();
        let mut a = Vector::<f64, _>::with_size(c.clone(), 2, 1, ParallelType::Parallel).unwrap();
        let mut b = Vector::<f64, _>::with_size(c, 2, 1, ParallelType::Parallel).unwrap();
        if me == 0 {
            a.add(1, 1.0).unwrap();
            b.add(1, 100.0).unwrap();
            a.close()
        } else {
            b.close()
        }
    });
    for r in out {
        assert!(matches!(r, Err(VectorError::CollectiveMismatch { .. })));
    }
}

#[test]
fn ghost_in_owned_range_fails_on_every_rank() {
    let out = run_ranks(2, |c| {
        let ghosts: &[usize] = if c.rank() == 0 { &[1] } else { &[] };
        Vector::<f64, _>::with_ghosts(c, 4, 2, ghosts, ParallelType::Ghosted).map(|_| ())
    });
    assert_eq!(
        out[0],
        Err(VectorError::GhostInOwnedRange {
            index: 1,
            first: 0,
            last: 2
        })
    );
    assert_eq!(out[1], Err(VectorError::PeerConfiguration { rank: 0 }));
}

#[test]
fn duplicate_ghosts_fail_on_every_rank() {
    let out = run_ranks(2, |c| {
        let ghosts: &[usize] = if c.rank() == 1 { &[0, 1, 0] } else { &[] };
        Vector::<f64, _>::with_ghosts(c, 4, 2, ghosts, ParallelType::Ghosted).map(|_| ())
    });
    assert_eq!(out[0], Err(VectorError::PeerConfiguration { rank: 1 }));
    assert!(matches!(
        out[1],
        Err(VectorError::DuplicateGhost { index: 0, .. })
    ));
    assert!(out.iter().all(|r| r.as_ref().unwrap_err().is_configuration()));
}

#[test]
fn ghost_list_with_parallel_type_is_rejected() {
    let mut v = Vector::<f64, _>::new(NoComm);
    assert_eq!(
        v.init_ghosted(4, 4, &[], false, ParallelType::Parallel),
        Err(VectorError::GhostsOnNonGhosted("Parallel"))
    );
}
