use std::cmp::Ordering;

use rustc_hash::FxHashSet;

use crate::errors::{CombiError, Result};

///
/// Sort tensor indices per dimension, ignoring that dimension, and split them
/// into 1d lines. `level_sets` must already be in lexicographic order.
///
fn sort_level_sets(level_sets: &[u32], ndim: usize) -> Result<(Vec<Vec<u32>>, Vec<Vec<u32>>)>
{
    let num_tensors = level_sets.len() / ndim;
    let tensor = |i: u32| -> Result<&[u32]>
    {
        level_sets.chunks_exact(ndim).nth(i as usize).ok_or(CombiError::NumericalDegeneracy(format!("tensor {i} out of range")))
    };

    let mut sorted_maps: Vec<Vec<u32>> = vec![(0..num_tensors as u32).collect(); ndim];
    let mut lines_1d: Vec<Vec<u32>> = vec![Vec::new(); ndim];

    let match_outside_dim = |dim: usize, a: &[u32], b: &[u32]| -> bool {
        a.iter()
            .zip(b.iter())
            .enumerate()
            .all(|(j, (&x, &y))| j == dim || x == y)
    };

    for dim in 0..ndim
    {
        // stable sort keeps the lexicographic order along `dim` inside each line
        sorted_maps[dim].sort_by(|&a, &b| {
            let idx_a = &level_sets[a as usize * ndim..(a as usize + 1) * ndim];
            let idx_b = &level_sets[b as usize * ndim..(b as usize + 1) * ndim];
            idx_a.iter()
                .zip(idx_b.iter())
                .enumerate()
                .filter(|(j, _)| *j != dim)
                .find_map(|(_, (&v_a, &v_b))| match v_a.cmp(&v_b) {
                    Ordering::Equal => None,
                    other => Some(other),
                })
                .unwrap_or(Ordering::Equal)
        });

        let mut current_idx = tensor(sorted_maps[dim][0])?;
        lines_1d[dim].push(0);
        for (i, &t) in sorted_maps[dim].iter().enumerate().skip(1)
        {
            let next_idx = tensor(t)?;
            if !match_outside_dim(dim, current_idx, next_idx)
            {
                lines_1d[dim].push(i as u32);
                current_idx = next_idx;
            }
        }
        lines_1d[dim].push(num_tensors as u32);
    }

    Ok((sorted_maps, lines_1d))
}

///
/// Combination coefficients of a downward closed set of level vectors
/// (flattened, `ndim` entries each) computed line by line, one dimension at
/// a time. Approach adapted from TASMANIAN. Independent of the
/// inclusion-exclusion formula, so the two can cross-check each other.
///
pub fn weight_modifiers(level_sets: &[u32], ndim: usize) -> Result<Vec<f64>>
{
    if ndim == 0 || level_sets.len() % ndim != 0
    {
        return Err(CombiError::DimensionMismatch { expected: ndim, found: level_sets.len() });
    }
    let num_tensors = level_sets.len() / ndim;
    if num_tensors == 0
    {
        return Ok(Vec::new());
    }

    // the line sweep requires lexicographic order
    let mut order: Vec<usize> = (0..num_tensors).collect();
    order.sort_by(|&a, &b| level_sets[a * ndim..(a + 1) * ndim].cmp(&level_sets[b * ndim..(b + 1) * ndim]));
    let sorted: Vec<u32> = order.iter().flat_map(|&i| level_sets[i * ndim..(i + 1) * ndim].iter().copied()).collect();

    let mut weights = vec![0.0; num_tensors];
    let (sorted_maps, lines_1d) = sort_level_sets(&sorted, ndim)?;

    // Step 1: the top of every line in the last dimension starts with weight one
    for i in lines_1d[ndim - 1].windows(2)
    {
        weights[sorted_maps[ndim - 1][i[1] as usize - 1] as usize] = 1.0;
    }

    // Step 2: process dimensions backwards, adjusting weights
    for dim in (0..ndim - 1).rev()
    {
        for segment in lines_1d[dim].windows(2)
        {
            let (start, end) = (segment[0], segment[1]);
            for i in (start..end - 1).rev()
            {
                let mut val = weights[sorted_maps[dim][i as usize] as usize];
                for j in i + 1..end
                {
                    val -= weights[sorted_maps[dim][j as usize] as usize];
                }
                weights[sorted_maps[dim][i as usize] as usize] = val;
            }
        }
    }

    let mut result = vec![0.0; num_tensors];
    for (position, &original) in order.iter().enumerate()
    {
        result[original] = weights[position];
    }
    Ok(result)
}

///
/// Smallest downward closed set (above `minimum`) containing `levels`, in
/// (level sum, lexicographic) order.
///
pub fn make_downward_closed(levels: &[Vec<u32>], minimum: &[u32]) -> Vec<Vec<u32>>
{
    let mut seen: FxHashSet<Vec<u32>> = FxHashSet::default();
    let mut stack: Vec<Vec<u32>> = levels.iter().filter(|l| l.iter().zip(minimum).all(|(a, b)| a >= b)).cloned().collect();
    while let Some(level) = stack.pop()
    {
        if !seen.insert(level.clone())
        {
            continue;
        }
        for d in 0..level.len()
        {
            if level[d] > minimum[d]
            {
                let mut neighbor = level.clone();
                neighbor[d] -= 1;
                if !seen.contains(&neighbor)
                {
                    stack.push(neighbor);
                }
            }
        }
    }
    let mut closed: Vec<Vec<u32>> = seen.into_iter().collect();
    closed.sort_by(|a, b| a.iter().sum::<u32>().cmp(&b.iter().sum::<u32>()).then_with(|| a.cmp(b)));
    closed
}

#[test]
fn check_weight_modifiers_simplex()
{
    // classical 2d combination technique: +1 on the diagonal, -1 below it
    let levels = [0, 0, 0, 1, 0, 2, 1, 0, 1, 1, 2, 0];
    let weights = weight_modifiers(&levels, 2).unwrap();
    assert_eq!(weights, vec![0.0, -1.0, 1.0, -1.0, 1.0, 1.0]);
}

#[test]
fn check_weight_modifiers_unsorted_and_1d()
{
    let levels = [1, 0, 0, 1, 0, 0];
    assert_eq!(weight_modifiers(&levels, 2).unwrap(), vec![1.0, 1.0, -1.0]);
    assert_eq!(weight_modifiers(&[2, 0, 1], 1).unwrap(), vec![1.0, 0.0, 0.0]);
}

#[test]
fn check_make_downward_closed()
{
    let closed = make_downward_closed(&[vec![1, 2]], &[0, 0]);
    assert_eq!(closed, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![0, 2], vec![1, 1], vec![1, 2]]);
    let closed = make_downward_closed(&[vec![2, 1]], &[1, 1]);
    assert_eq!(closed, vec![vec![1, 1], vec![2, 1]]);
}
