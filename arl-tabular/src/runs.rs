use crate::QTable;
use arl_core::rng::seed_rng;
use rayon::prelude::*;

/// Runs `num_runs` independent experiments on the rayon pool. Run `i` reseeds the generator of
/// its worker thread with `seed + i`, so results do not depend on scheduling.
pub fn run_parallel<T, F>(num_runs: usize, seed: u64, run: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    (0..num_runs)
        .into_par_iter()
        .map(|i| {
            seed_rng(seed.wrapping_add(i as u64));
            run(i)
        })
        .collect()
}

/// Element wise mean of equally shaped tables.
pub fn average_tables(tables: &[QTable]) -> QTable {
    let Some(first) = tables.first() else {
        return vec![];
    };
    let n = tables.len() as f64;
    let mut mean = vec![vec![0.; first.first().map_or(0, |row| row.len())]; first.len()];
    for table in tables {
        for (mean_row, row) in mean.iter_mut().zip(table) {
            for (m, x) in mean_row.iter_mut().zip(row) {
                *m += x / n;
            }
        }
    }
    mean
}
