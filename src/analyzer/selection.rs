// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::analyzer::scoring::PoolScore;
use crate::domain::constants::{FORCED_ASSET_DENOM, MAX_ALLOCATION_ITERATIONS};
use crate::domain::error::AppError;
use crate::domain::params::ScoringParameters;
use crate::domain::pool::{Pool, PoolId};
use std::collections::{BTreeMap, HashMap};

/// Select the top `max_pools` by score, forcing in the best-scoring pool
/// that contains the governance asset when one exists.
///
/// Returns the selected ids and the forced pool id (None when no pool
/// carries the forced asset, in which case no forced minimum applies).
pub fn select_top_pools(
    scored: &[PoolScore],
    params: &ScoringParameters,
    pools: &HashMap<PoolId, Pool>,
) -> Result<(Vec<PoolId>, Option<PoolId>), AppError> {
    if scored.is_empty() {
        return Err(AppError::DataMissing("no pools provided for selection".into()));
    }
    if params.max_pools == 0 {
        return Err(AppError::AllocationConstraints(
            "max_pools must be positive".into(),
        ));
    }

    // An invalid score anywhere means an upstream bug; refuse to rank.
    for entry in scored {
        if !entry.score.is_finite() {
            return Err(AppError::Math(format!(
                "pool {} has invalid score {}",
                entry.pool_id, entry.score
            )));
        }
    }

    // Highest-scoring pool containing the forced asset.
    let forced_pool = scored
        .iter()
        .filter(|entry| {
            pools.get(&entry.pool_id).is_some_and(|pool| {
                pool.token_a.base_denom == FORCED_ASSET_DENOM
                    || pool.token_b.base_denom == FORCED_ASSET_DENOM
            })
        })
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .map(|entry| entry.pool_id);

    let mut ranked: Vec<&PoolScore> = scored.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let take = (params.max_pools as usize).min(ranked.len());
    let mut selected: Vec<PoolId> = ranked[..take].iter().map(|entry| entry.pool_id).collect();

    match forced_pool {
        Some(forced) if !selected.contains(&forced) => {
            // Evict the lowest-ranked member to make room.
            if let Some(evicted) = selected.pop() {
                tracing::warn!(
                    forced_pool = forced,
                    evicted_pool = evicted,
                    "forced-asset pool outside top selection, replacing lowest-scoring pool"
                );
            }
            selected.push(forced);
        }
        Some(_) => {}
        None => {
            tracing::warn!("no pool contains the forced asset, forced minimum will not apply");
        }
    }

    tracing::info!(
        count = selected.len(),
        forced_pool = forced_pool.unwrap_or(0),
        "pool selection complete"
    );
    Ok((selected, forced_pool))
}

/// Compute target allocation fractions for the selected pools.
///
/// Allocations start proportional to score and are pushed inside
/// [effective_min, max_allocation] by iterative water-filling: any pool
/// outside its band is locked at the violated bound and the remainder is
/// redistributed over the still-unlocked pools, at most
/// `MAX_ALLOCATION_ITERATIONS` times. The forced pool's effective minimum
/// is `forced_allocation_minimum`; everyone else uses `min_allocation`.
pub fn determine_target_allocations(
    selected: &[PoolId],
    scores: &HashMap<PoolId, PoolScore>,
    params: &ScoringParameters,
    forced_pool: Option<PoolId>,
) -> Result<BTreeMap<PoolId, f64>, AppError> {
    if selected.is_empty() {
        return Ok(BTreeMap::new());
    }
    params.validate_allocation()?;

    let n = selected.len();
    let forced_selected = forced_pool.is_some_and(|id| selected.contains(&id));

    // Feasibility of the minimums, with float tolerance.
    let min_total = if forced_selected {
        params.forced_allocation_minimum + (n - 1) as f64 * params.min_allocation
    } else {
        n as f64 * params.min_allocation
    };
    if min_total > 1.000_01 {
        return Err(AppError::AllocationImpossible(format!(
            "minimum allocations for {n} pools require {min_total:.4} of the vault"
        )));
    }
    let equal_share = 1.0 / n as f64;
    if equal_share > params.max_allocation {
        return Err(AppError::AllocationImpossible(format!(
            "equal share {equal_share:.4} per pool violates max_allocation {:.4}",
            params.max_allocation
        )));
    }

    // Every selected pool needs a strictly positive score for a
    // score-proportional split to mean anything.
    let mut pool_scores: Vec<(PoolId, f64)> = Vec::with_capacity(n);
    let mut total_score = 0.0;
    for id in selected {
        let entry = scores
            .get(id)
            .ok_or_else(|| AppError::DataMissing(format!("score missing for pool {id}")))?;
        if !entry.score.is_finite() {
            return Err(AppError::Math(format!(
                "pool {id} has invalid score {}",
                entry.score
            )));
        }
        if entry.score <= 0.0 {
            return Err(AppError::AllocationConstraints(format!(
                "pool {id} has non-positive score {:.6}, cannot allocate by score",
                entry.score
            )));
        }
        pool_scores.push((*id, entry.score));
        total_score += entry.score;
    }
    if total_score <= 0.0 {
        return Err(AppError::AllocationConstraints(
            "total score of selected pools is non-positive".into(),
        ));
    }

    let effective_min = |id: PoolId| -> f64 {
        if forced_pool == Some(id) {
            params.forced_allocation_minimum
        } else {
            params.min_allocation
        }
    };

    let mut allocations: BTreeMap<PoolId, f64> = pool_scores
        .iter()
        .map(|(id, score)| (*id, score / total_score))
        .collect();

    let mut locked: BTreeMap<PoolId, f64> = BTreeMap::new();
    let mut unlocked: BTreeMap<PoolId, f64> = pool_scores.iter().copied().collect();

    let mut iteration = 0;
    let mut changed = true;
    while changed && iteration < MAX_ALLOCATION_ITERATIONS {
        changed = false;
        iteration += 1;

        let mut remaining = 1.0 - locked.values().sum::<f64>();
        if remaining < -0.000_01 {
            return Err(AppError::AllocationConstraints(
                "constraint enforcement over-allocated the vault".into(),
            ));
        }
        remaining = remaining.max(0.0);

        if unlocked.is_empty() {
            break;
        }
        let unlocked_score: f64 = unlocked.values().sum();
        if unlocked_score <= 0.0 {
            return Err(AppError::AllocationConstraints(
                "total unlocked score is non-positive during enforcement".into(),
            ));
        }

        let mut to_lock: Vec<(PoolId, f64)> = Vec::new();
        for (&id, &score) in &unlocked {
            let proportional = (score / unlocked_score) * remaining;
            allocations.insert(id, proportional);

            let min_bound = effective_min(id);
            if proportional < min_bound {
                to_lock.push((id, min_bound));
                changed = true;
            } else if proportional > params.max_allocation {
                to_lock.push((id, params.max_allocation));
                changed = true;
            }
        }
        for (id, bound) in to_lock {
            tracing::debug!(pool_id = id, bound, iteration, "locking allocation at bound");
            locked.insert(id, bound);
            unlocked.remove(&id);
        }
    }
    if changed && iteration == MAX_ALLOCATION_ITERATIONS {
        return Err(AppError::AllocationImpossible(format!(
            "constraint enforcement did not converge after {MAX_ALLOCATION_ITERATIONS} iterations"
        )));
    }

    let mut targets: BTreeMap<PoolId, f64> = BTreeMap::new();
    let mut total = 0.0;
    for id in selected {
        let value = locked
            .get(id)
            .or_else(|| allocations.get(id))
            .copied()
            .ok_or_else(|| AppError::DataMissing(format!("allocation missing for pool {id}")))?;
        targets.insert(*id, value);
        total += value;
    }

    if (total - 1.0).abs() > 0.001 {
        return Err(AppError::AllocationConstraints(format!(
            "final allocation sum {total:.6} deviates from 1.0"
        )));
    }
    if total <= 0.0 {
        return Err(AppError::AllocationConstraints(
            "final allocation sum is zero".into(),
        ));
    }
    let scale = 1.0 / total;
    for value in targets.values_mut() {
        *value *= scale;
    }

    // Bounds must survive normalization within tolerance.
    for (&id, &value) in &targets {
        let min_bound = effective_min(id);
        if value < min_bound - 0.000_01 || value > params.max_allocation + 0.000_01 {
            return Err(AppError::AllocationConstraints(format!(
                "final allocation for pool {id} ({value:.6}) violates [{min_bound:.4}, {:.4}]",
                params.max_allocation
            )));
        }
    }

    for (&id, &value) in &targets {
        tracing::info!(
            pool_id = id,
            allocation_pct = value * 100.0,
            forced = forced_pool == Some(id),
            "target allocation"
        );
    }
    Ok(targets)
}
