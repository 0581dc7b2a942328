//! Routing fee estimation.
//!
//! Produces a lower bound for the fee and CLTV delta needed to pay an invoice.
//! Candidates are the direct route to the destination plus one route per
//! usable route hint. For a hint the node estimates the cost of reaching the
//! hint's first hop, then the hint's own hop fees and deltas are added on top.
//! The cheapest candidate wins.

use futures::future::join_all;

use crate::error::{Error, Result};
use crate::transport::TransportFuture;
use crate::types::{DecodedInvoice, RouteHint};

/// Source of the node-side numbers the estimator combines.
pub trait RouteFeeSource: Send + Sync {
    /// Current chain tip height.
    fn block_height(&self) -> TransportFuture<'_, u64>;

    /// Lower-bound fee and absolute time lock to reach `destination` (hex
    /// public key) with `amount_msat`.
    fn lower_bound<'a>(
        &'a self,
        destination: &'a str,
        amount_msat: u64,
    ) -> TransportFuture<'a, RouteLowerBound>;
}

/// Node estimate for one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLowerBound {
    pub fee_msat: u64,
    /// Absolute block height the HTLC locks until.
    pub time_lock: u64,
}

/// Result of [`estimate_routing_fee`].
#[derive(Debug)]
pub struct RoutingFeeEstimate {
    /// Lower-bound routing fee.
    pub fee_msat: u64,
    /// Lower-bound CLTV delta, including the invoice's final CLTV expiry.
    pub cltv_delta: u64,
    /// Candidates that could not be evaluated.
    pub candidate_errors: Vec<Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    fee_msat: u64,
    cltv_delta: u64,
}

/// Estimate the fee and CLTV delta needed to pay `invoice`.
///
/// The invoice amount takes precedence over `amount_msat`, which is only used
/// for amount-less invoices. Failing candidates do not abort the estimate,
/// they are reported in [`RoutingFeeEstimate::candidate_errors`]. When no
/// candidate succeeds every candidate error is returned in
/// [`Error::NoRouteFound`].
pub async fn estimate_routing_fee<S>(
    source: &S,
    invoice: &DecodedInvoice,
    amount_msat: u64,
) -> Result<RoutingFeeEstimate>
where
    S: RouteFeeSource + ?Sized,
{
    let amount_msat = match (invoice.num_msat, amount_msat) {
        (0, 0) => return Err(Error::AmountRequired),
        (0, amount) => amount,
        (invoice_amount, _) => invoice_amount,
    };

    let height = source.block_height().await?;

    let direct = async {
        let bound = source.lower_bound(&invoice.destination, amount_msat).await?;
        relative_to(bound, height)
    };
    let hints = invoice
        .route_hints
        .iter()
        .enumerate()
        .map(|(index, hint)| hint_candidate(source, index, hint, amount_msat, height));

    let (direct, hints) = futures::join!(direct, join_all(hints));

    let mut best: Option<Candidate> = None;
    let mut candidate_errors = Vec::new();
    for result in std::iter::once(direct).chain(hints) {
        match result {
            Ok(candidate) => {
                if best.is_none_or(|b| candidate.fee_msat < b.fee_msat) {
                    best = Some(candidate);
                }
            }
            Err(e) => {
                log::warn!("Skipping fee candidate: {}", e);
                candidate_errors.push(e);
            }
        }
    }

    let Some(best) = best else {
        return Err(Error::NoRouteFound {
            errors: candidate_errors,
        });
    };

    Ok(RoutingFeeEstimate {
        fee_msat: best.fee_msat,
        cltv_delta: best.cltv_delta.saturating_add(invoice.cltv_expiry),
        candidate_errors,
    })
}

async fn hint_candidate<S>(
    source: &S,
    index: usize,
    hint: &RouteHint,
    amount_msat: u64,
    height: u64,
) -> Result<Candidate>
where
    S: RouteFeeSource + ?Sized,
{
    let first = hint
        .hop_hints
        .first()
        .ok_or(Error::EmptyRouteHint { index })?;

    // Private destinations are rarely routable directly, so the node is asked
    // for the way to the edge of the hint.
    let bound = source.lower_bound(&first.node_id, amount_msat).await?;
    let mut candidate = relative_to(bound, height)?;
    for hop in &hint.hop_hints {
        candidate.fee_msat = candidate.fee_msat.saturating_add(hop.fee_msat(amount_msat));
        candidate.cltv_delta = candidate.cltv_delta.saturating_add(hop.cltv_expiry_delta);
    }

    Ok(candidate)
}

fn relative_to(bound: RouteLowerBound, height: u64) -> Result<Candidate> {
    let cltv_delta = bound
        .time_lock
        .checked_sub(height)
        .ok_or(Error::TimeLockBelowHeight {
            time_lock: bound.time_lock,
            height,
        })?;

    Ok(Candidate {
        fee_msat: bound.fee_msat,
        cltv_delta,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::HopHint;

    const DEST: &str = "02aa";
    const EDGE: &str = "03bb";
    const OTHER_EDGE: &str = "03cc";
    const HEIGHT: u64 = 800_000;

    #[derive(Default)]
    struct StaticSource {
        bounds: HashMap<&'static str, RouteLowerBound>,
        queried: std::sync::Mutex<Vec<(String, u64)>>,
    }

    impl StaticSource {
        fn with(mut self, dest: &'static str, fee_msat: u64, time_lock: u64) -> Self {
            self.bounds.insert(
                dest,
                RouteLowerBound {
                    fee_msat,
                    time_lock,
                },
            );
            self
        }
    }

    impl RouteFeeSource for StaticSource {
        fn block_height(&self) -> TransportFuture<'_, u64> {
            Box::pin(async { Ok(HEIGHT) })
        }

        fn lower_bound<'a>(
            &'a self,
            destination: &'a str,
            amount_msat: u64,
        ) -> TransportFuture<'a, RouteLowerBound> {
            Box::pin(async move {
                self.queried
                    .lock()
                    .unwrap()
                    .push((destination.to_string(), amount_msat));
                self.bounds
                    .get(destination)
                    .copied()
                    .ok_or_else(|| Error::Api {
                        endpoint: "estimatefee".to_string(),
                        status: 500,
                        message: format!("no route to {}", destination),
                    })
            })
        }
    }

    fn hop(node_id: &str, fee_base_msat: u64, fee_ppm: u64, cltv_expiry_delta: u64) -> HopHint {
        HopHint {
            node_id: node_id.to_string(),
            channel_id: 1,
            fee_base_msat,
            fee_ppm,
            cltv_expiry_delta,
        }
    }

    fn invoice(num_msat: u64, route_hints: Vec<RouteHint>) -> DecodedInvoice {
        DecodedInvoice {
            destination: DEST.to_string(),
            num_msat,
            cltv_expiry: 40,
            route_hints,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn direct_route_only() {
        let source = StaticSource::default().with(DEST, 1_500, HEIGHT + 100);

        let estimate = estimate_routing_fee(&source, &invoice(1_000_000, vec![]), 0)
            .await
            .unwrap();

        assert_eq!(estimate.fee_msat, 1_500);
        // (L - H) + E
        assert_eq!(estimate.cltv_delta, 100 + 40);
        assert!(estimate.candidate_errors.is_empty());
    }

    #[tokio::test]
    async fn cheaper_hint_wins_with_its_own_delta() {
        let source = StaticSource::default()
            .with(DEST, 100_000, HEIGHT + 200)
            .with(EDGE, 40_000, HEIGHT + 30);
        let hint = RouteHint {
            hop_hints: vec![hop(EDGE, 9_000, 1_000, 20)],
        };

        let estimate = estimate_routing_fee(&source, &invoice(1_000_000, vec![hint]), 0)
            .await
            .unwrap();

        // 40_000 + 9_000 + 1_000_000 * 1_000 / 1_000_000
        assert_eq!(estimate.fee_msat, 50_000);
        assert_eq!(estimate.cltv_delta, 30 + 20 + 40);
    }

    #[tokio::test]
    async fn hop_fees_accumulate_across_the_hint() {
        let source = StaticSource::default().with(EDGE, 1_000, HEIGHT + 10);
        let hint = RouteHint {
            hop_hints: vec![hop(EDGE, 100, 10, 40), hop("03dd", 200, 20, 144)],
        };

        let estimate = estimate_routing_fee(&source, &invoice(2_000_000, vec![hint]), 0)
            .await
            .unwrap();

        assert_eq!(estimate.fee_msat, 1_000 + (100 + 20) + (200 + 40));
        assert_eq!(estimate.cltv_delta, 10 + 40 + 144 + 40);
        // the direct route had no estimate
        assert_eq!(estimate.candidate_errors.len(), 1);
    }

    #[tokio::test]
    async fn hint_is_priced_from_its_first_hop() {
        let source = StaticSource::default()
            .with(DEST, 10, HEIGHT + 10)
            .with(EDGE, 10, HEIGHT + 10);
        let hint = RouteHint {
            hop_hints: vec![hop(EDGE, 0, 0, 0), hop(OTHER_EDGE, 0, 0, 0)],
        };

        estimate_routing_fee(&source, &invoice(5_000, vec![hint]), 0)
            .await
            .unwrap();

        let mut queried: Vec<String> = source
            .queried
            .lock()
            .unwrap()
            .iter()
            .map(|(dest, _)| dest.clone())
            .collect();
        queried.sort();
        assert_eq!(queried, vec![DEST.to_string(), EDGE.to_string()]);
    }

    #[tokio::test]
    async fn ties_keep_the_earliest_candidate() {
        let source = StaticSource::default()
            .with(DEST, 500, HEIGHT + 10)
            .with(EDGE, 500, HEIGHT + 99);
        let hint = RouteHint {
            hop_hints: vec![hop(EDGE, 0, 0, 0)],
        };

        let estimate = estimate_routing_fee(&source, &invoice(5_000, vec![hint]), 0)
            .await
            .unwrap();

        assert_eq!(estimate.fee_msat, 500);
        assert_eq!(estimate.cltv_delta, 10 + 40);
    }

    #[tokio::test]
    async fn empty_hint_is_not_fatal() {
        let source = StaticSource::default().with(DEST, 700, HEIGHT + 18);

        let estimate = estimate_routing_fee(
            &source,
            &invoice(5_000, vec![RouteHint::default()]),
            0,
        )
        .await
        .unwrap();

        assert_eq!(estimate.fee_msat, 700);
        assert!(matches!(
            estimate.candidate_errors.as_slice(),
            [Error::EmptyRouteHint { index: 0 }]
        ));
    }

    #[tokio::test]
    async fn bad_hint_does_not_stop_the_others() {
        let source = StaticSource::default().with(OTHER_EDGE, 300, HEIGHT + 5);
        let hints = vec![
            RouteHint::default(),
            RouteHint {
                hop_hints: vec![hop(EDGE, 0, 0, 0)],
            },
            RouteHint {
                hop_hints: vec![hop(OTHER_EDGE, 1, 0, 6)],
            },
        ];

        let estimate = estimate_routing_fee(&source, &invoice(5_000, hints), 0)
            .await
            .unwrap();

        assert_eq!(estimate.fee_msat, 301);
        assert_eq!(estimate.cltv_delta, 5 + 6 + 40);
        assert_eq!(estimate.candidate_errors.len(), 3);
    }

    #[tokio::test]
    async fn stale_time_lock_skips_the_candidate() {
        let source = StaticSource::default()
            .with(DEST, 10, HEIGHT - 3)
            .with(EDGE, 500, HEIGHT + 12);
        let hint = RouteHint {
            hop_hints: vec![hop(EDGE, 0, 0, 8)],
        };

        let estimate = estimate_routing_fee(&source, &invoice(5_000, vec![hint]), 0)
            .await
            .unwrap();

        assert_eq!(estimate.fee_msat, 500);
        assert_eq!(estimate.cltv_delta, 12 + 8 + 40);
        assert!(matches!(
            estimate.candidate_errors[..],
            [Error::TimeLockBelowHeight {
                time_lock: 799_997,
                height: HEIGHT
            }]
        ));
    }

    #[tokio::test]
    async fn no_candidate_means_no_route() {
        let source = StaticSource::default();

        let err = estimate_routing_fee(&source, &invoice(5_000, vec![RouteHint::default()]), 0)
            .await
            .unwrap_err();

        match err {
            Error::NoRouteFound { errors } => {
                assert_eq!(errors.len(), 2);
                assert!(matches!(errors[0], Error::Api { .. }));
                assert!(matches!(errors[1], Error::EmptyRouteHint { index: 0 }));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn invoice_amount_overrides_caller_amount() {
        let source = StaticSource::default().with(DEST, 1, HEIGHT + 1);

        estimate_routing_fee(&source, &invoice(42_000, vec![]), 7_000)
            .await
            .unwrap();
        estimate_routing_fee(&source, &invoice(0, vec![]), 7_000)
            .await
            .unwrap();

        let amounts: Vec<u64> = source
            .queried
            .lock()
            .unwrap()
            .iter()
            .map(|(_, amount)| *amount)
            .collect();
        assert_eq!(amounts, vec![42_000, 7_000]);
    }

    #[tokio::test]
    async fn amount_required() {
        let source = StaticSource::default().with(DEST, 1, HEIGHT + 1);

        let err = estimate_routing_fee(&source, &invoice(0, vec![]), 0)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AmountRequired));
        assert!(source.queried.lock().unwrap().is_empty());
    }
}
