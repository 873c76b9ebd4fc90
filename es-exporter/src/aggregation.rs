//! Flattening of multi-level bucket aggregations into labeled doc counts.
//!
//! Every aggregation name met on the way down becomes a label whose value is
//! the bucket key. Leaf buckets emit their `doc_count`. Each branch owns its
//! own copy of the label assignment, so siblings never see each other's keys.

use serde_json::{Map, Value};

const KEY: &str = "key";
const DOC_COUNT: &str = "doc_count";
const BUCKETS: &str = "buckets";

/// Ordered label assignment; names keep first-encounter order.
pub type Labels = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq)]
pub struct BucketSample {
    pub labels: Labels,
    pub doc_count: f64,
}

impl BucketSample {
    pub fn label_names(&self) -> Vec<&str> {
        self.labels.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn label_values(&self) -> Vec<&str> {
        self.labels.iter().map(|(_, value)| value.as_str()).collect()
    }
}

/// Walks the `aggregations` object of a search response.
pub fn flatten_aggregations(tree: &Value) -> FlattenAggregations<'_> {
    let stack = match tree {
        Value::Object(map) => vec![Frame::Aggs {
            entries: map.iter(),
            labels: Labels::new(),
        }],
        _ => Vec::new(),
    };
    FlattenAggregations { stack }
}

enum BucketIter<'a> {
    List(std::slice::Iter<'a, Value>),
    Keyed(serde_json::map::Iter<'a>),
}

enum Frame<'a> {
    Aggs {
        entries: serde_json::map::Iter<'a>,
        labels: Labels,
    },
    Buckets {
        agg_key: &'a str,
        buckets: BucketIter<'a>,
        labels: Labels,
    },
}

pub struct FlattenAggregations<'a> {
    stack: Vec<Frame<'a>>,
}

fn assign(labels: &mut Labels, name: &str, value: String) {
    match labels.iter_mut().find(|(existing, _)| existing == name) {
        Some((_, slot)) => *slot = value,
        None => labels.push((name.to_string(), value)),
    }
}

/// Strings are used as-is. Every other key, including the object keys of
/// composite aggregations, is rendered as compact JSON.
fn key_to_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A bucket is descended into only when one of its values is itself a bucket
/// aggregation. Metric sub-aggregations and `key_as_string` do not count.
fn sub_aggregations(bucket: &Map<String, Value>) -> bool {
    bucket
        .iter()
        .filter(|(name, _)| name.as_str() != KEY && name.as_str() != DOC_COUNT)
        .any(|(_, value)| value.get(BUCKETS).is_some())
}

impl Iterator for FlattenAggregations<'_> {
    type Item = BucketSample;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let child = match frame {
                Frame::Aggs { entries, labels } => {
                    let Some((agg_key, agg)) = entries.next() else {
                        self.stack.pop();
                        continue;
                    };
                    if agg_key == KEY || agg_key == DOC_COUNT {
                        continue;
                    }
                    let buckets = match agg.get(BUCKETS) {
                        Some(Value::Array(items)) => BucketIter::List(items.iter()),
                        Some(Value::Object(keyed)) => BucketIter::Keyed(keyed.iter()),
                        _ => continue,
                    };
                    Frame::Buckets {
                        agg_key: agg_key.as_str(),
                        buckets,
                        labels: labels.clone(),
                    }
                }
                Frame::Buckets {
                    agg_key,
                    buckets,
                    labels,
                } => {
                    let next = match buckets {
                        BucketIter::List(items) => items
                            .next()
                            .map(|bucket| (bucket.get(KEY).map(key_to_label), bucket)),
                        BucketIter::Keyed(entries) => {
                            entries.next().map(|(key, bucket)| (Some(key.clone()), bucket))
                        }
                    };
                    let Some((key, bucket)) = next else {
                        self.stack.pop();
                        continue;
                    };
                    let (Some(key), Value::Object(bucket)) = (key, bucket) else {
                        continue;
                    };

                    let mut branch = labels.clone();
                    assign(&mut branch, *agg_key, key);

                    if sub_aggregations(bucket) {
                        Frame::Aggs {
                            entries: bucket.iter(),
                            labels: branch,
                        }
                    } else {
                        let Some(doc_count) = bucket.get(DOC_COUNT).and_then(Value::as_f64) else {
                            continue;
                        };
                        return Some(BucketSample {
                            labels: branch,
                            doc_count,
                        });
                    }
                }
            };
            self.stack.push(child);
        }
    }
}
