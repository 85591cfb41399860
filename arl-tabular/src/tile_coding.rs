//! Tile coding with an index hash table, after Sutton's `tiles3`.

use std::{
    collections::HashMap,
    hash::{DefaultHasher, Hash, Hasher},
};

/// Assigns consecutive indices to tile coordinates. Once `size` indices are handed out, new
/// coordinates are hashed into the existing range and counted as overfull.
#[derive(Debug, Clone)]
pub struct IHT {
    size: usize,
    overfull_count: usize,
    dictionary: HashMap<Vec<i64>, usize>,
}

impl IHT {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "an index hash table needs room for at least one tile");
        Self {
            size,
            overfull_count: 0,
            dictionary: HashMap::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn count(&self) -> usize {
        self.dictionary.len()
    }

    pub fn overfull_count(&self) -> usize {
        self.overfull_count
    }

    /// The index of `coordinates`. Read only lookups of unseen coordinates return `None`.
    pub fn get_index(&mut self, coordinates: &[i64], read_only: bool) -> Option<usize> {
        if let Some(index) = self.dictionary.get(coordinates) {
            return Some(*index);
        }
        if read_only {
            return None;
        }
        let count = self.count();
        if count >= self.size {
            if self.overfull_count == 0 {
                log::warn!("IHT full, starting to allow collisions");
            }
            self.overfull_count += 1;
            let mut hasher = DefaultHasher::new();
            coordinates.hash(&mut hasher);
            return Some(hasher.finish() as usize % self.size);
        }
        self.dictionary.insert(coordinates.to_vec(), count);
        Some(count)
    }
}

/// One active tile per tiling. `floats` should already be scaled so that one unit is one tile
/// width; `ints` are appended to every coordinate (e.g. the action).
pub fn tiles(iht: &mut IHT, num_tilings: usize, floats: &[f64], ints: &[i64]) -> Vec<usize> {
    tiles_impl(iht, num_tilings, floats, ints, false)
        .into_iter()
        .flatten()
        .collect()
}

/// Like [`tiles`] but never grows the table. Unseen tiles are skipped.
pub fn tiles_read_only(iht: &mut IHT, num_tilings: usize, floats: &[f64], ints: &[i64]) -> Vec<usize> {
    tiles_impl(iht, num_tilings, floats, ints, true)
        .into_iter()
        .flatten()
        .collect()
}

fn tiles_impl(
    iht: &mut IHT,
    num_tilings: usize,
    floats: &[f64],
    ints: &[i64],
    read_only: bool,
) -> Vec<Option<usize>> {
    let n = num_tilings as i64;
    let qfloats = floats
        .iter()
        .map(|f| (f * num_tilings as f64).floor() as i64)
        .collect::<Vec<_>>();
    (0..n)
        .map(|tiling| {
            let tiling_x2 = tiling * 2;
            let mut coords = Vec::with_capacity(1 + qfloats.len() + ints.len());
            coords.push(tiling);
            let mut b = tiling;
            for q in qfloats.iter() {
                coords.push((q + b).div_euclid(n));
                b += tiling_x2;
            }
            coords.extend_from_slice(ints);
            iht.get_index(&coords, read_only)
        })
        .collect()
}

/// Scales each state dimension from `[low, high]` to `num_tiles` tiles before tiling.
#[derive(Debug, Clone)]
pub struct TileCoder {
    iht: IHT,
    num_tilings: usize,
    lows: Vec<f64>,
    scales: Vec<f64>,
}

impl TileCoder {
    pub fn new(iht_size: usize, num_tilings: usize, num_tiles: usize, lows: &[f64], highs: &[f64]) -> Self {
        assert!(num_tilings > 0, "num_tilings must be positive");
        assert_eq!(lows.len(), highs.len(), "bounds must have the same length");
        let scales = lows
            .iter()
            .zip(highs)
            .map(|(low, high)| {
                assert!(high > low, "upper bound must exceed lower bound");
                num_tiles as f64 / (high - low)
            })
            .collect();
        Self {
            iht: IHT::new(iht_size),
            num_tilings,
            lows: lows.to_vec(),
            scales,
        }
    }

    pub fn num_tilings(&self) -> usize {
        self.num_tilings
    }

    pub fn iht(&self) -> &IHT {
        &self.iht
    }

    pub fn active_tiles(&mut self, state: &[f64], action: Option<usize>) -> Vec<usize> {
        let floats = state
            .iter()
            .zip(self.lows.iter().zip(self.scales.iter()))
            .map(|(x, (low, scale))| (x - low) * scale)
            .collect::<Vec<_>>();
        let ints = action.map(|a| vec![a as i64]).unwrap_or_default();
        tiles(&mut self.iht, self.num_tilings, &floats, &ints)
    }
}

#[cfg(test)]
mod test {
    use super::{IHT, TileCoder, tiles, tiles_read_only};

    #[test]
    fn one_tile_per_tiling() {
        let mut iht = IHT::new(1024);
        let active = tiles(&mut iht, 8, &[3.6, 7.21], &[]);
        assert_eq!(active.len(), 8);
        assert_eq!(active, (0..8).collect::<Vec<_>>());
        // the same point maps to the same tiles
        assert_eq!(tiles(&mut iht, 8, &[3.6, 7.21], &[]), active);
    }

    #[test]
    fn nearby_points_share_tiles() {
        let mut iht = IHT::new(1024);
        let a = tiles(&mut iht, 8, &[3.6, 7.21], &[]);
        let b = tiles(&mut iht, 8, &[3.7, 7.21], &[]);
        let far = tiles(&mut iht, 8, &[10., -4.], &[]);
        let shared = a.iter().filter(|t| b.contains(t)).count();
        assert!(shared > 0 && shared < 8);
        assert!(a.iter().all(|t| !far.contains(t)));
    }

    #[test]
    fn full_table_collides_instead_of_growing() {
        let mut iht = IHT::new(4);
        let active = tiles(&mut iht, 8, &[0.5], &[]);
        assert!(active.iter().all(|t| *t < 4));
        assert_eq!(iht.count(), 4);
        assert_eq!(iht.overfull_count(), 4);
        assert!(tiles_read_only(&mut iht, 8, &[100.], &[]).is_empty());
    }

    #[test]
    fn actions_get_distinct_tiles() {
        let mut coder = TileCoder::new(4096, 8, 8, &[-1.2, -0.07], &[0.6, 0.07]);
        let left = coder.active_tiles(&[-0.5, 0.], Some(0));
        let right = coder.active_tiles(&[-0.5, 0.], Some(2));
        assert!(left.iter().all(|t| !right.contains(t)));
        assert_eq!(coder.iht().count(), 16);
    }
}
