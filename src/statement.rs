// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
    sync::Arc,
};

use crate::{error::UsageError, packets::Column};

/// Server side model of a prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementModel {
    id: u32,
    params: Arc<[Column]>,
    columns: Arc<[Column]>,
    warnings: u16,
}

impl StatementModel {
    pub fn new(
        id: u32,
        params: Vec<Column>,
        columns: Vec<Column>,
        warnings: u16,
    ) -> Self {
        Self {
            id,
            params: params.into(),
            columns: columns.into(),
            warnings,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn params(&self) -> &Arc<[Column]> {
        &self.params
    }

    pub fn columns(&self) -> &Arc<[Column]> {
        &self.columns
    }

    pub fn warnings(&self) -> u16 {
        self.warnings
    }
}

#[derive(Debug, Default)]
struct Inner {
    model: Option<StatementModel>,
    stale: bool,
}

/// Handle of a prepared statement.
///
/// Returned right away by `Session::prepare` and populated once the server confirms the
/// statement. The id is only valid for the session that prepared it; the handle goes
/// stale when that session closes or the statement is closed.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    inner: Rc<RefCell<Inner>>,
}

impl Statement {
    pub(crate) fn pending() -> Self {
        Self::default()
    }

    pub(crate) fn set_model(&self, model: StatementModel) {
        self.inner.borrow_mut().model = Some(model);
    }

    pub(crate) fn mark_stale(&self) {
        self.inner.borrow_mut().stale = true;
    }

    /// Statement id, if prepared.
    pub fn id(&self) -> Option<u32> {
        self.inner.borrow().model.as_ref().map(StatementModel::id)
    }

    pub fn model(&self) -> Option<StatementModel> {
        self.inner.borrow().model.clone()
    }

    pub fn num_params(&self) -> Option<usize> {
        self.inner.borrow().model.as_ref().map(|x| x.params.len())
    }

    pub fn num_columns(&self) -> Option<usize> {
        self.inner.borrow().model.as_ref().map(|x| x.columns.len())
    }

    pub fn is_prepared(&self) -> bool {
        self.inner.borrow().model.is_some()
    }

    pub fn is_stale(&self) -> bool {
        self.inner.borrow().stale
    }

    /// Returns the id if the statement can be executed with `supplied` parameters.
    pub(crate) fn check_execute(&self, supplied: usize) -> Result<u32, UsageError> {
        let inner = self.inner.borrow();
        if inner.stale {
            return Err(UsageError::StaleStatement);
        }
        let model = inner.model.as_ref().ok_or(UsageError::NotPrepared)?;
        if model.params.len() != supplied {
            return Err(UsageError::ParamCount {
                expected: model.params.len(),
                supplied,
            });
        }
        Ok(model.id)
    }

    /// Returns the id if `index` names a parameter of the statement.
    pub(crate) fn check_param(&self, index: u16) -> Result<u32, UsageError> {
        let inner = self.inner.borrow();
        if inner.stale {
            return Err(UsageError::StaleStatement);
        }
        let model = inner.model.as_ref().ok_or(UsageError::NotPrepared)?;
        if usize::from(index) >= model.params.len() {
            return Err(UsageError::NoSuchParam(index));
        }
        Ok(model.id)
    }
}

/// Weak references to every statement prepared through a session.
#[derive(Debug, Default)]
pub(crate) struct StatementRegistry {
    statements: Vec<Weak<RefCell<Inner>>>,
}

impl StatementRegistry {
    pub(crate) fn register(&mut self, statement: &Statement) {
        self.statements.retain(|x| x.strong_count() > 0);
        self.statements.push(Rc::downgrade(&statement.inner));
    }

    /// Marks every live statement stale.
    pub(crate) fn invalidate(&mut self) {
        for inner in self.statements.drain(..).filter_map(|x| x.upgrade()) {
            inner.borrow_mut().stale = true;
        }
    }
}
