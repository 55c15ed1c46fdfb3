//! Subscription manager (C7): tracks shape requests per subscription and
//! drives initial-snapshot delivery (`spec.md` §4.7).
//!
//! `subscribe` only validates the request and admits the subscription;
//! the actual snapshot pull happens in `deliver_snapshot`, so a
//! `ShapeSizeLimitExceeded` failure discovered mid-pull surfaces as a
//! `SubsDataError` against an already-acked subscription rather than
//! folding into the `SubscribeResp`.

use std::collections::HashMap;

use electric_protocol::error::{ShapeDeliveryErrorCode, ShapeDeliveryErrorDetail, ShapeRequestErrorCode, ShapeRequestErrorDetail};
use electric_protocol::message::{ShapeRequest, ShapeSelect};
use electric_protocol::Lsn;

use crate::collaborators::{SnapshotBatch, SnapshotError, SubscriptionDataSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeStatus {
    Requested,
    Active,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    pub request_id: String,
    pub selects: Vec<ShapeSelect>,
    pub status: ShapeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Requested,
    Active,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub shapes: Vec<Shape>,
    pub status: SubscriptionStatus,
    pub established_at_lsn: Option<Lsn>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Ack { subscription_id: String },
    DuplicateId,
    ShapeRequestError(Vec<ShapeRequestErrorDetail>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliverOutcome {
    Delivered { batches: Vec<SnapshotBatch> },
    Failed(Vec<ShapeDeliveryErrorDetail>),
}

/// One connection's set of live subscriptions, keyed by `subscription_id`
/// (`spec.md` §4.7: ids are unique per connection, not globally).
#[derive(Default)]
pub struct SubscriptionManager {
    subscriptions: HashMap<String, Subscription>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Subscription> {
        self.subscriptions.get(id)
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.subscriptions
            .values()
            .filter(|s| matches!(s.status, SubscriptionStatus::Active))
            .map(|s| s.id.clone())
            .collect()
    }

    /// `subscribe(subscription_id, shape_requests) -> ack | error` per the
    /// §4.7 table. Validates shape table names against `known_tables`;
    /// admits the subscription as `Requested` on success.
    pub fn subscribe(
        &mut self,
        subscription_id: String,
        shape_requests: Vec<ShapeRequest>,
        known_tables: &dyn Fn(&str) -> bool,
    ) -> SubscribeOutcome {
        if self.subscriptions.contains_key(&subscription_id) {
            return SubscribeOutcome::DuplicateId;
        }

        let mut errors = Vec::new();
        for req in &shape_requests {
            if req.selects.is_empty() {
                errors.push(ShapeRequestErrorDetail {
                    request_id: req.request_id.clone(),
                    code: ShapeRequestErrorCode::EmptyShapeDefinition,
                    table_name: None,
                });
                continue;
            }
            let mut seen_tables = std::collections::HashSet::new();
            for select in &req.selects {
                if !known_tables(&select.table_name) {
                    errors.push(ShapeRequestErrorDetail {
                        request_id: req.request_id.clone(),
                        code: ShapeRequestErrorCode::TableNotFound,
                        table_name: Some(select.table_name.clone()),
                    });
                } else if !seen_tables.insert(select.table_name.clone()) {
                    errors.push(ShapeRequestErrorDetail {
                        request_id: req.request_id.clone(),
                        code: ShapeRequestErrorCode::DuplicateTableInShape,
                        table_name: Some(select.table_name.clone()),
                    });
                }
            }
        }
        if !errors.is_empty() {
            return SubscribeOutcome::ShapeRequestError(errors);
        }

        let shapes: Vec<Shape> = shape_requests
            .into_iter()
            .map(|req| Shape {
                request_id: req.request_id,
                selects: req.selects,
                status: ShapeStatus::Requested,
            })
            .collect();
        self.subscriptions.insert(
            subscription_id.clone(),
            Subscription {
                id: subscription_id.clone(),
                shapes,
                status: SubscriptionStatus::Requested,
                established_at_lsn: None,
            },
        );
        SubscribeOutcome::Ack { subscription_id }
    }

    /// Pulls the initial snapshot for a `Requested` subscription and
    /// transitions it to `Active`, or to `Cancelled` on failure
    /// (`spec.md` §4.7). Returns the batches for the caller to frame as
    /// `SubsDataBegin`/`ShapeDataBegin`.../`SubsDataEnd`.
    pub async fn deliver_snapshot(
        &mut self,
        subscription_id: &str,
        data_source: &dyn SubscriptionDataSource,
    ) -> Option<DeliverOutcome> {
        let shapes = self.subscriptions.get(subscription_id)?.shapes.clone();
        match data_source.snapshot(subscription_id, &shapes).await {
            Ok((lsn, batches)) => {
                let sub = self.subscriptions.get_mut(subscription_id)?;
                for shape in &mut sub.shapes {
                    shape.status = ShapeStatus::Active;
                }
                sub.status = SubscriptionStatus::Active;
                sub.established_at_lsn = Some(lsn);
                Some(DeliverOutcome::Delivered { batches })
            }
            Err(SnapshotError::ShapeSizeLimitExceeded { request_id }) => {
                self.fail(subscription_id);
                Some(DeliverOutcome::Failed(vec![ShapeDeliveryErrorDetail {
                    request_id,
                    code: ShapeDeliveryErrorCode::ShapeSizeLimitExceeded,
                }]))
            }
        }
    }

    /// `unsubscribe` is idempotent: unknown ids are silently ignored
    /// (`spec.md` §4.7, testable property "idempotent unsubscribe").
    pub fn unsubscribe(&mut self, subscription_ids: &[String]) {
        for id in subscription_ids {
            if let Some(sub) = self.subscriptions.get_mut(id) {
                sub.status = SubscriptionStatus::Cancelled;
            }
        }
    }

    /// Mark a subscription `Cancelled` after a failed snapshot delivery.
    pub fn fail(&mut self, subscription_id: &str) {
        if let Some(sub) = self.subscriptions.get_mut(subscription_id) {
            sub.status = SubscriptionStatus::Cancelled;
        }
    }
}
