// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Shared fixtures: an in-memory users table with per-column batch fetch functions
//! that record every call they receive.

#![allow(dead_code, reason = "each test file uses a different subset of the fixtures")]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rowloader::{BatchFetch, Key, KeySpec, Loader, Projection, Row, Value};

pub type TestResult = Result<(), rowloader::Error>;

pub fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

pub fn user(id: i64, name: &str, email: &str) -> Row {
    Row::new().with("id", id).with("name", name).with("email", email)
}

pub fn users() -> Vec<Row> {
    vec![
        user(1, "luckydrq", "luckydrq@gmail.com"),
        user(2, "dengruoqi", "dengruoqi@gmail.com"),
        user(3, "xuezu", "xuezu@gmail.com"),
    ]
}

/// An in-memory table whose fetch functions log the key batches they are called with.
#[derive(Debug)]
pub struct Db {
    rows: Vec<Row>,
    batches: Mutex<HashMap<String, Vec<Vec<Key>>>>,
    failing: AtomicBool,
}

impl Db {
    pub fn new() -> Arc<Self> {
        Self::with_rows(users())
    }

    pub fn with_rows(rows: Vec<Row>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            batches: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        })
    }

    /// Returns a batch fetch function matching rows on `spec`.
    ///
    /// Rows come back in table order, not key order, and keys without a row are left out.
    pub fn fetch_by<S: Into<KeySpec>>(self: &Arc<Self>, spec: S) -> impl BatchFetch<Row> + use<S> {
        let db = Arc::clone(self);
        let spec = spec.into();
        move |keys: Vec<Key>| {
            db.batches.lock().entry(spec.to_string()).or_default().push(keys.clone());
            let failing = db.failing.load(Ordering::SeqCst);
            let rows: Vec<Row> = db
                .rows
                .iter()
                .filter(|row| keys.iter().any(|key| Projection::of(*row, &spec).matches(key)))
                .cloned()
                .collect();
            async move {
                if failing {
                    Err("connection reset".into())
                } else {
                    Ok::<_, rowloader::BoxError>(rows)
                }
            }
        }
    }

    /// Makes every fetch started from now on fail, or succeed again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The key batches `spec` was fetched with, in call order.
    pub fn batches(&self, spec: impl Into<KeySpec>) -> Vec<Vec<Key>> {
        self.batches.lock().get(&spec.into().to_string()).cloned().unwrap_or_default()
    }

    /// The number of fetch calls made for `spec`.
    pub fn calls(&self, spec: impl Into<KeySpec>) -> usize {
        self.batches(spec).len()
    }

    /// The total number of fetch calls made for any spec.
    pub fn total_calls(&self) -> usize {
        self.batches.lock().values().map(Vec::len).sum()
    }
}

/// A loader over `db` keyed by `id` with unique keys `name`, `email` and `[name, email]`.
pub fn users_loader(db: &Arc<Db>) -> Loader<Row> {
    Loader::builder(db.fetch_by("id"))
        .name("users")
        .unique_key("name", db.fetch_by("name"))
        .unique_key("email", db.fetch_by("email"))
        .unique_key(["name", "email"], db.fetch_by(["name", "email"]))
        .build()
        .expect("fixture configuration is valid")
}

pub fn id(record: &Option<Arc<Row>>) -> Option<i64> {
    record.as_ref().and_then(|r| r.get("id")).and_then(Value::as_i64)
}

pub fn ids(records: &[Option<Arc<Row>>]) -> Vec<Option<i64>> {
    records.iter().map(id).collect()
}

pub fn text<'a>(record: &'a Option<Arc<Row>>, column: &str) -> Option<&'a str> {
    record.as_ref().and_then(|r| r.get(column)).and_then(Value::as_str)
}
