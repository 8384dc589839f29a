use crate::errors::{DgpError, Result};
use crate::parameters::DEFAULT_CHUNK_SIZE;
use crate::types::Prediction;

use log::debug;
use ndarray::{concatenate, Array, Array2, ArrayView, ArrayView1, Axis, Dimension, RemoveAxis};
use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::ops::Range;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Random generator shared by the clones of a model
pub(crate) type RngRef = Arc<RwLock<Xoshiro256Plus>>;

pub(crate) fn default_rng() -> RngRef {
    Arc::new(RwLock::new(Xoshiro256Plus::from_entropy()))
}

/// Split `n` independent random streams off the shared generator.
///
/// The lock is only held while streams are cloned and the generator jumped,
/// sampling then goes on with the returned streams.
pub(crate) fn jump_streams(rng: &RngRef, n: usize) -> Result<Vec<Xoshiro256Plus>> {
    let mut rng = rng
        .write()
        .map_err(|e| DgpError::SampleError(e.to_string()))?;
    Ok((0..n)
        .map(|_| {
            let stream = rng.clone();
            rng.jump();
            stream
        })
        .collect())
}

/// Draw `n` gaussian samples per row given means and variances, (rows, n) array
pub(crate) fn draw_normal<R: Rng>(
    mean: &ArrayView1<f64>,
    var: &ArrayView1<f64>,
    n: usize,
    rng: &mut R,
) -> Array2<f64> {
    let eps = Array2::<f64>::random_using((mean.len(), n), StandardNormal, rng);
    eps * &var.mapv(f64::sqrt).insert_axis(Axis(1)) + &mean.view().insert_axis(Axis(1))
}

/// Default number of chunks for `n` test points
pub(crate) fn default_chunk_num(n: usize) -> usize {
    n.div_ceil(DEFAULT_CHUNK_SIZE).max(1)
}

/// Split `0..n` in `chunk_num` contiguous ranges, the first `n % chunk_num`
/// ranges having one more element than the others
pub(crate) fn chunk_ranges(n: usize, chunk_num: usize) -> Vec<Range<usize>> {
    let chunk_num = chunk_num.max(1);
    let (size, extra) = (n / chunk_num, n % chunk_num);
    let mut start = 0;
    (0..chunk_num)
        .map(|i| {
            let end = start + size + usize::from(i < extra);
            let range = start..end;
            start = end;
            range
        })
        .collect()
}

/// Number of workers used to process `chunk_num` chunks: at most the number
/// of available cores minus one and at least one
pub(crate) fn worker_num(chunk_num: usize, core_num: Option<usize>) -> usize {
    let cores = core_num.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .saturating_sub(1)
    });
    cores.min(chunk_num).max(1)
}

/// Apply `f` to every chunk of rows `0..n` using a dedicated pool of workers.
/// Results are returned in chunk order, the first failure fails the whole computation.
pub(crate) fn dispatch_chunks<T, F>(
    n: usize,
    chunk_num: Option<usize>,
    core_num: Option<usize>,
    f: F,
) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize, Range<usize>) -> Result<T> + Sync,
{
    let chunk_num = chunk_num.unwrap_or_else(|| default_chunk_num(n));
    let ranges = chunk_ranges(n, chunk_num);
    let n_workers = worker_num(ranges.len(), core_num);
    debug!(
        "Dispatch {} points in {} chunks on {} workers",
        n,
        ranges.len(),
        n_workers
    );
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_workers)
        .build()
        .map_err(|e| DgpError::WorkerError(e.to_string()))?;
    let now = Instant::now();
    let results = pool.install(|| {
        ranges
            .into_par_iter()
            .enumerate()
            .map(|(i, range)| f(i, range))
            .collect::<Result<Vec<T>>>()
    })?;
    debug!("Chunks processed in {:?}", now.elapsed());
    Ok(results)
}

/// Concatenate arrays along the first axis
pub(crate) fn concat_rows<D: Dimension + RemoveAxis>(
    arrays: &[Array<f64, D>],
) -> Result<Array<f64, D>> {
    let views: Vec<ArrayView<f64, D>> = arrays.iter().map(|a| a.view()).collect();
    concatenate(Axis(0), &views).map_err(|e| DgpError::InvalidValueError(e.to_string()))
}

/// Concatenate per-node arrays of chunks (chunk, node) into per-node arrays
fn concat_nodes<D: Dimension + RemoveAxis>(
    chunks: Vec<Vec<Array<f64, D>>>,
) -> Result<Vec<Array<f64, D>>> {
    let n_nodes = chunks.first().map_or(0, |c| c.len());
    (0..n_nodes)
        .map(|j| {
            let parts: Vec<Array<f64, D>> = chunks.iter().map(|c| c[j].clone()).collect();
            concat_rows(&parts)
        })
        .collect()
}

/// Merge predictions of consecutive chunks of test points
pub(crate) fn concat_predictions(parts: Vec<Prediction>) -> Result<Prediction> {
    let mismatch = || DgpError::InvalidValueError("Chunk predictions mismatch".to_string());
    match parts.first() {
        None => Err(mismatch()),
        Some(Prediction::MeanVar { .. }) => {
            let (mut means, mut vars) = (vec![], vec![]);
            for p in parts {
                match p {
                    Prediction::MeanVar { mean, var } => {
                        means.push(mean);
                        vars.push(var);
                    }
                    _ => return Err(mismatch()),
                }
            }
            Ok(Prediction::MeanVar {
                mean: concat_rows(&means)?,
                var: concat_rows(&vars)?,
            })
        }
        Some(Prediction::LayerMeanVar { .. }) => {
            let (mut means, mut vars) = (vec![], vec![]);
            for p in parts {
                match p {
                    Prediction::LayerMeanVar { mean, var } => {
                        means.push(mean);
                        vars.push(var);
                    }
                    _ => return Err(mismatch()),
                }
            }
            Ok(Prediction::LayerMeanVar {
                mean: concat_nodes(means)?,
                var: concat_nodes(vars)?,
            })
        }
        Some(Prediction::Samples(_)) => {
            let samples = parts
                .into_iter()
                .map(|p| match p {
                    Prediction::Samples(s) => Ok(s),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Prediction::Samples(concat_nodes(samples)?))
        }
        Some(Prediction::LayerSamples(first)) => {
            let n_layers = first.len();
            let mut layers: Vec<Vec<Vec<_>>> = vec![vec![]; n_layers];
            for p in parts {
                match p {
                    Prediction::LayerSamples(s) if s.len() == n_layers => {
                        for (l, layer) in s.into_iter().enumerate() {
                            layers[l].push(layer);
                        }
                    }
                    _ => return Err(mismatch()),
                }
            }
            Ok(Prediction::LayerSamples(
                layers
                    .into_iter()
                    .map(concat_nodes)
                    .collect::<Result<Vec<_>>>()?,
            ))
        }
    }
}
