//! Serialization of sub-boxes into channel buffers and back.
//!
//! The wire order is fixed: arrays concatenated in registration order, each
//! array's sub-box walked in logical row-major order (axis 2 fastest),
//! independent of the storage layout. Both strategies produce identical
//! buffers; `Bulk` only replaces the per-element walk with contiguous-run
//! copies when the innermost logical axis is the contiguous one.

use crate::exchange::channel::NeighborChannel;
use crate::layout::{LayoutDescriptor, NDIMS};

/// How sub-boxes are copied to and from channel buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackStrategy {
    /// Element-by-element copy through the strided address computation.
    Manual,
    /// Copy whole contiguous runs when the storage layout allows it,
    /// falling back to `Manual` otherwise.
    #[default]
    Bulk,
}

/// Fill a channel's send buffer from the send sub-box of every array.
pub(crate) fn pack_channel<T: Copy>(
    strategy: PackStrategy,
    channel: &mut NeighborChannel<T>,
    arrays: &[&[T]],
    strides: [usize; NDIMS],
    inner_contiguous: bool,
) {
    channel.send_buf.clear();
    let sbox = channel.send_box;
    for array in arrays {
        match strategy {
            PackStrategy::Bulk if inner_contiguous => {
                let run = sbox.ranges[2].len();
                for i in sbox.ranges[0].lo..sbox.ranges[0].hi {
                    for j in sbox.ranges[1].lo..sbox.ranges[1].hi {
                        let base =
                            LayoutDescriptor::offset(strides, [i, j, sbox.ranges[2].lo]);
                        channel.send_buf.extend_from_slice(&array[base..base + run]);
                    }
                }
            }
            _ => {
                sbox.for_each(|idx| {
                    channel
                        .send_buf
                        .push(array[LayoutDescriptor::offset(strides, idx)]);
                });
            }
        }
    }
}

/// Scatter a channel's receive buffer into the receive sub-box of every
/// array, in the same order `pack_channel` used on the sending side.
pub(crate) fn unpack_channel<T: Copy>(
    strategy: PackStrategy,
    channel: &NeighborChannel<T>,
    arrays: &mut [&mut [T]],
    strides: [usize; NDIMS],
    inner_contiguous: bool,
) {
    let rbox = channel.recv_box;
    debug_assert_eq!(channel.recv_buf.len(), rbox.volume() * arrays.len());
    let mut cursor = 0usize;
    for array in arrays.iter_mut() {
        match strategy {
            PackStrategy::Bulk if inner_contiguous => {
                let run = rbox.ranges[2].len();
                for i in rbox.ranges[0].lo..rbox.ranges[0].hi {
                    for j in rbox.ranges[1].lo..rbox.ranges[1].hi {
                        let base =
                            LayoutDescriptor::offset(strides, [i, j, rbox.ranges[2].lo]);
                        array[base..base + run]
                            .copy_from_slice(&channel.recv_buf[cursor..cursor + run]);
                        cursor += run;
                    }
                }
            }
            _ => {
                rbox.for_each(|idx| {
                    array[LayoutDescriptor::offset(strides, idx)] = channel.recv_buf[cursor];
                    cursor += 1;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::Direction;
    use crate::halo::HaloDescriptor;
    use crate::topology::CartGrid;

    const PERMUTATIONS: [[i32; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    fn test_channel(dir: Direction) -> NeighborChannel<f64> {
        let h = [
            HaloDescriptor::new(1, 1, 1, 3, 5).unwrap(),
            HaloDescriptor::new(1, 1, 1, 3, 5).unwrap(),
            HaloDescriptor::new(1, 1, 1, 3, 5).unwrap(),
        ];
        let topo = CartGrid::new([1, 1, 1], [0, 0, 0], [true; 3]);
        NeighborChannel::build(dir, &h, &topo, 1)
    }

    fn filled_storage(layout: LayoutDescriptor) -> Vec<f64> {
        let lengths = [5, 5, 5];
        let strides = layout.strides(lengths);
        let mut data = vec![0.0; layout.storage_len(lengths)];
        for i in 0..5 {
            for j in 0..5 {
                for k in 0..5 {
                    data[LayoutDescriptor::offset(strides, [i, j, k])] =
                        (i * 100 + j * 10 + k) as f64;
                }
            }
        }
        data
    }

    #[test]
    fn manual_and_bulk_are_byte_identical_for_all_layouts() {
        for ranks in PERMUTATIONS {
            let layout = LayoutDescriptor::new(ranks).unwrap();
            let strides = layout.strides([5, 5, 5]);
            let data = filled_storage(layout);
            for dir in Direction::all() {
                let mut manual = test_channel(dir);
                let mut bulk = test_channel(dir);
                pack_channel(
                    PackStrategy::Manual,
                    &mut manual,
                    &[data.as_slice()],
                    strides,
                    layout.is_contiguous(2),
                );
                pack_channel(
                    PackStrategy::Bulk,
                    &mut bulk,
                    &[data.as_slice()],
                    strides,
                    layout.is_contiguous(2),
                );
                assert_eq!(
                    manual.send_buf, bulk.send_buf,
                    "strategies diverge for layout {ranks:?} direction {:?}",
                    dir.0
                );
            }
        }
    }

    #[test]
    fn packing_twice_yields_identical_buffers() {
        let layout = LayoutDescriptor::row_major();
        let strides = layout.strides([5, 5, 5]);
        let data = filled_storage(layout);
        let mut c = test_channel(Direction([1, 1, 0]));
        pack_channel(PackStrategy::Bulk, &mut c, &[data.as_slice()], strides, true);
        let first = c.send_buf.clone();
        pack_channel(PackStrategy::Bulk, &mut c, &[data.as_slice()], strides, true);
        assert_eq!(c.send_buf, first);
    }

    #[test]
    fn arrays_are_concatenated_in_registration_order() {
        let layout = LayoutDescriptor::row_major();
        let strides = layout.strides([5, 5, 5]);
        let a = filled_storage(layout);
        let b: Vec<f64> = a.iter().map(|v| v + 1000.0).collect();
        let mut c = test_channel(Direction([1, 0, 0]));
        pack_channel(PackStrategy::Manual, &mut c, &[a.as_slice(), b.as_slice()], strides, true);
        let vol = c.volume();
        assert_eq!(c.send_buf.len(), 2 * vol);
        for p in 0..vol {
            assert_eq!(c.send_buf[vol + p], c.send_buf[p] + 1000.0);
        }
    }

    #[test]
    fn loopback_roundtrip_restores_sent_values() {
        // Zero neighbor distance: feed the send buffer straight into the
        // receive side and check values land in the mirror sub-box.
        let layout = LayoutDescriptor::new([2, 0, 1]).unwrap();
        let strides = layout.strides([5, 5, 5]);
        let data = filled_storage(layout);
        for dir in Direction::all() {
            let mut c = test_channel(dir);
            pack_channel(
                PackStrategy::Bulk,
                &mut c,
                &[data.as_slice()],
                strides,
                layout.is_contiguous(2),
            );
            c.recv_buf = c.send_buf.clone();

            let mut out = vec![-1.0; data.len()];
            let mut slot = out.as_mut_slice();
            unpack_channel(
                PackStrategy::Bulk,
                &c,
                std::slice::from_mut(&mut slot),
                strides,
                layout.is_contiguous(2),
            );

            // Gather what was sent and what arrived, in wire order.
            let mut sent = Vec::new();
            c.send_box
                .for_each(|idx| sent.push(data[LayoutDescriptor::offset(strides, idx)]));
            let mut arrived = Vec::new();
            c.recv_box
                .for_each(|idx| arrived.push(out[LayoutDescriptor::offset(strides, idx)]));
            assert_eq!(sent, arrived);
        }
    }
}
