//! End-to-end halo exchange tests over the in-process transport.
//!
//! Each test drives one pattern per simulated rank through the
//! `post_receives -> pack -> do_sends -> wait -> unpack` cycle in lockstep
//! and verifies halo contents against the global domain by modular
//! arithmetic, the same check the classic 3D exchange benchmarks use.

use gridhalo::exchange::{HaloExchange, InProcessNetwork, PackStrategy};
use gridhalo::layout::LayoutDescriptor;
use gridhalo::topology::{CartGrid, CartTopology};
use gridhalo::HaloError;

/// Interior cells per axis on every rank.
const DIM: usize = 4;
/// Halo width on every axis.
const H: usize = 1;
/// Local storage extent per axis.
const TOTAL: usize = DIM + 2 * H;

const SENTINEL: i64 = -1;

fn build_pattern(
    net: &InProcessNetwork<i64>,
    grid: CartGrid,
    layout: LayoutDescriptor,
    strategy: PackStrategy,
    max_arrays: usize,
) -> HaloExchange<i64> {
    let rank = grid.local_rank();
    let mut he = HaloExchange::new(layout, Box::new(grid), Box::new(net.endpoint(rank)))
        .with_strategy(strategy);
    for axis in 0..3 {
        he.add_halo(axis, H, H, H, DIM + H - 1, TOTAL).unwrap();
    }
    he.setup(max_arrays).unwrap();
    he
}

/// Global linear index of global coordinates under the given process grid.
fn global_index(dims: [usize; 3], g: [usize; 3]) -> i64 {
    let ext = [dims[0] * DIM, dims[1] * DIM, dims[2] * DIM];
    ((g[0] * ext[1] + g[1]) * ext[2] + g[2]) as i64
}

/// Fill interior cells with their global linear index (plus `offset`),
/// everything else with the sentinel.
fn init_array(
    dims: [usize; 3],
    coords: [usize; 3],
    layout: LayoutDescriptor,
    offset: i64,
) -> Vec<i64> {
    let strides = layout.strides([TOTAL; 3]);
    let mut data = vec![SENTINEL; layout.storage_len([TOTAL; 3])];
    for i in H..DIM + H {
        for j in H..DIM + H {
            for k in H..DIM + H {
                let g = [
                    coords[0] * DIM + i - H,
                    coords[1] * DIM + j - H,
                    coords[2] * DIM + k - H,
                ];
                data[LayoutDescriptor::offset(strides, [i, j, k])] =
                    global_index(dims, g) + offset;
            }
        }
    }
    data
}

/// Expected value of any local cell after one exchange: the global index of
/// the true neighboring cell, wrapping on periodic axes, sentinel where a
/// non-periodic edge leaves the halo untouched.
fn expected_value(
    dims: [usize; 3],
    periods: [bool; 3],
    coords: [usize; 3],
    idx: [usize; 3],
    offset: i64,
) -> i64 {
    let mut g = [0usize; 3];
    for a in 0..3 {
        let ext = (dims[a] * DIM) as i64;
        let raw = (coords[a] * DIM + idx[a]) as i64 - H as i64;
        if raw < 0 || raw >= ext {
            if !periods[a] {
                return SENTINEL;
            }
            g[a] = raw.rem_euclid(ext) as usize;
        } else {
            g[a] = raw as usize;
        }
    }
    global_index(dims, g) + offset
}

fn run_round(patterns: &mut [HaloExchange<i64>], arrays: &mut [Vec<i64>]) {
    for p in patterns.iter_mut() {
        p.post_receives().unwrap();
    }
    for (p, a) in patterns.iter_mut().zip(arrays.iter()) {
        p.pack(&[a.as_slice()]).unwrap();
    }
    for p in patterns.iter_mut() {
        p.do_sends().unwrap();
    }
    for p in patterns.iter_mut() {
        p.wait().unwrap();
    }
    for (p, a) in patterns.iter_mut().zip(arrays.iter_mut()) {
        let mut slot = a.as_mut_slice();
        p.unpack(std::slice::from_mut(&mut slot)).unwrap();
    }
}

fn check_all_cells(
    dims: [usize; 3],
    periods: [bool; 3],
    layout: LayoutDescriptor,
    arrays: &[Vec<i64>],
    offset: i64,
) {
    let strides = layout.strides([TOTAL; 3]);
    for (rank, data) in arrays.iter().enumerate() {
        let grid = CartGrid::new(dims, [0, 0, 0], periods);
        let coords = grid.coords_of(rank as i32);
        for i in 0..TOTAL {
            for j in 0..TOTAL {
                for k in 0..TOTAL {
                    let want = expected_value(dims, periods, coords, [i, j, k], offset);
                    let got = data[LayoutDescriptor::offset(strides, [i, j, k])];
                    assert_eq!(
                        got, want,
                        "rank {rank} coords {coords:?} cell ({i},{j},{k})"
                    );
                }
            }
        }
    }
}

fn run_scenario(
    dims: [usize; 3],
    periods: [bool; 3],
    layout: LayoutDescriptor,
    strategy: PackStrategy,
) -> Vec<Vec<i64>> {
    let nranks = dims[0] * dims[1] * dims[2];
    let net = InProcessNetwork::new();
    let mut patterns = Vec::new();
    let mut arrays = Vec::new();
    for rank in 0..nranks {
        let probe = CartGrid::new(dims, [0, 0, 0], periods);
        let coords = probe.coords_of(rank as i32);
        patterns.push(build_pattern(
            &net,
            CartGrid::new(dims, coords, periods),
            layout,
            strategy,
            1,
        ));
        arrays.push(init_array(dims, coords, layout, 0));
    }
    run_round(&mut patterns, &mut arrays);
    check_all_cells(dims, periods, layout, &arrays, 0);
    arrays
}

#[test]
fn two_by_two_periodic_grid_fills_every_halo_cell() {
    // The reference scenario: 2x2x1 ranks, 4x4x4 interiors, halo 1, fully
    // periodic, verified over the 8x8x4 global domain.
    run_scenario(
        [2, 2, 1],
        [true, true, true],
        LayoutDescriptor::row_major(),
        PackStrategy::Bulk,
    );
}

#[test]
fn single_rank_periodic_wraps_onto_itself() {
    // One process per axis: every neighbor is the rank itself, so a value
    // at the minus edge of the core must reappear in the plus halo.
    let arrays = run_scenario(
        [1, 1, 1],
        [true, true, true],
        LayoutDescriptor::row_major(),
        PackStrategy::Bulk,
    );
    let strides = LayoutDescriptor::row_major().strides([TOTAL; 3]);
    let data = &arrays[0];
    for j in H..DIM + H {
        for k in H..DIM + H {
            let minus_edge = data[LayoutDescriptor::offset(strides, [H, j, k])];
            let plus_halo = data[LayoutDescriptor::offset(strides, [DIM + H, j, k])];
            assert_eq!(plus_halo, minus_edge);
        }
    }
}

#[test]
fn non_periodic_edges_are_never_overwritten() {
    // Axis 0 open with two ranks: the outer x halos keep their sentinel,
    // the inner face exchanges normally. Other axes wrap onto themselves.
    run_scenario(
        [2, 1, 1],
        [false, true, true],
        LayoutDescriptor::row_major(),
        PackStrategy::Bulk,
    );
}

#[test]
fn fully_open_single_rank_keeps_all_sentinels() {
    run_scenario(
        [1, 1, 1],
        [false, false, false],
        LayoutDescriptor::row_major(),
        PackStrategy::Manual,
    );
}

#[test]
fn permuted_layout_exchanges_correctly() {
    run_scenario(
        [2, 2, 1],
        [true, true, true],
        LayoutDescriptor::new([2, 0, 1]).unwrap(),
        PackStrategy::Bulk,
    );
}

#[test]
fn manual_and_bulk_strategies_agree_end_to_end() {
    for layout in [
        LayoutDescriptor::row_major(),
        LayoutDescriptor::new([2, 1, 0]).unwrap(),
    ] {
        let manual = run_scenario([2, 2, 1], [true, false, true], layout, PackStrategy::Manual);
        let bulk = run_scenario([2, 2, 1], [true, false, true], layout, PackStrategy::Bulk);
        assert_eq!(manual, bulk);
    }
}

#[test]
fn repeated_rounds_are_bit_identical() {
    let dims = [2, 2, 1];
    let periods = [true, true, true];
    let layout = LayoutDescriptor::row_major();
    let net = InProcessNetwork::new();
    let mut patterns = Vec::new();
    let mut arrays = Vec::new();
    for rank in 0..4 {
        let probe = CartGrid::new(dims, [0, 0, 0], periods);
        let coords = probe.coords_of(rank);
        patterns.push(build_pattern(
            &net,
            CartGrid::new(dims, coords, periods),
            layout,
            PackStrategy::Bulk,
            1,
        ));
        arrays.push(init_array(dims, coords, layout, 0));
    }

    run_round(&mut patterns, &mut arrays);
    let after_first = arrays.clone();
    for _ in 0..3 {
        run_round(&mut patterns, &mut arrays);
        assert_eq!(arrays, after_first);
    }
}

#[test]
fn two_arrays_exchange_in_one_round() {
    let dims = [2, 2, 1];
    let periods = [true, true, true];
    let layout = LayoutDescriptor::row_major();
    let net = InProcessNetwork::new();
    let mut patterns = Vec::new();
    let mut pairs: Vec<(Vec<i64>, Vec<i64>)> = Vec::new();
    for rank in 0..4 {
        let probe = CartGrid::new(dims, [0, 0, 0], periods);
        let coords = probe.coords_of(rank);
        patterns.push(build_pattern(
            &net,
            CartGrid::new(dims, coords, periods),
            layout,
            PackStrategy::Bulk,
            2,
        ));
        pairs.push((
            init_array(dims, coords, layout, 0),
            init_array(dims, coords, layout, 1000),
        ));
    }

    for p in patterns.iter_mut() {
        p.post_receives().unwrap();
    }
    for (p, (a, b)) in patterns.iter_mut().zip(pairs.iter()) {
        p.pack(&[a.as_slice(), b.as_slice()]).unwrap();
    }
    for p in patterns.iter_mut() {
        p.do_sends().unwrap();
    }
    for p in patterns.iter_mut() {
        p.wait().unwrap();
    }
    for (p, (a, b)) in patterns.iter_mut().zip(pairs.iter_mut()) {
        let mut refs = [a.as_mut_slice(), b.as_mut_slice()];
        p.unpack(&mut refs).unwrap();
    }

    let first: Vec<Vec<i64>> = pairs.iter().map(|(a, _)| a.clone()).collect();
    let second: Vec<Vec<i64>> = pairs.iter().map(|(_, b)| b.clone()).collect();
    check_all_cells(dims, periods, layout, &first, 0);
    check_all_cells(dims, periods, layout, &second, 1000);
}

#[test]
fn over_capacity_pack_fails_without_partial_writes() {
    let net = InProcessNetwork::new();
    let grid = CartGrid::new([1, 1, 1], [0, 0, 0], [true; 3]);
    let mut he = build_pattern(
        &net,
        grid,
        LayoutDescriptor::row_major(),
        PackStrategy::Bulk,
        1,
    );
    he.post_receives().unwrap();
    let a = vec![0i64; TOTAL * TOTAL * TOTAL];
    let b = vec![0i64; TOTAL * TOTAL * TOTAL];
    let err = he.pack(&[a.as_slice(), b.as_slice()]).unwrap_err();
    assert!(matches!(err, HaloError::TooManyArrays { given: 2, max: 1 }));
    // The round is still usable with a conforming array count.
    he.pack(&[a.as_slice()]).unwrap();
    he.do_sends().unwrap();
    he.wait().unwrap();
}

#[test]
fn out_of_order_do_sends_is_rejected() {
    let net = InProcessNetwork::new();
    let grid = CartGrid::new([1, 1, 1], [0, 0, 0], [true; 3]);
    let mut he = build_pattern(
        &net,
        grid,
        LayoutDescriptor::row_major(),
        PackStrategy::Bulk,
        1,
    );
    he.post_receives().unwrap();
    assert!(matches!(
        he.do_sends(),
        Err(HaloError::ProtocolViolation { op: "do_sends", .. })
    ));
    // The misuse did not corrupt the round.
    let a = vec![0i64; TOTAL * TOTAL * TOTAL];
    he.pack(&[a.as_slice()]).unwrap();
    he.do_sends().unwrap();
    he.wait().unwrap();
}
