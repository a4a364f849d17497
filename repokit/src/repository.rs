//! Generic transactional repository
//!
//! [`Repository<M>`] is a stateless view of one model's table bound to an
//! [`Engine`]. It is cheap to clone. Inside [`Repository::transaction`] the
//! repository handed to the callback is bound to the open transaction, and
//! calling `transaction` again on it joins the same transaction.
//!
//! # Example
//!
//! ```rust,ignore
//! use repokit::{cond, Page, Repository};
//!
//! let accounts: Repository<Account> = Repository::new(engine.clone());
//! accounts.create(&[Account::new("ada@example.com")]).await?;
//!
//! let adults = accounts
//!     .find_all_by_condition([cond!("age >= ?", 18)], &["name"])
//!     .await?;
//!
//! accounts
//!     .transaction(|tx| async move {
//!         tx.delete(7).await?;
//!         tx.rebind::<AuditEntry>().create(&[AuditEntry::deleted(7)]).await?;
//!         Ok(())
//!     })
//!     .await?;
//! ```

use std::future::Future;
use std::marker::PhantomData;

use crate::condition::{apply_conditions, apply_order, Condition, Criteria, Statement};
use crate::engine::dialect::quote_ident;
use crate::engine::{Engine, Target};
use crate::error::{Error, Operation, Result};
use crate::model::{Column, Model};
use crate::pagination::{Page, PageResult};
use crate::value::Value;

/// CRUD, query and paging operations for one model
pub struct Repository<M: Model> {
    engine: Engine,
    table: String,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for Repository<M> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            table: self.table.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> std::fmt::Debug for Repository<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("model", &M::NAME)
            .field("table", &self.table)
            .field("engine", &self.engine)
            .finish()
    }
}

impl<M: Model> Repository<M> {
    /// Repository over the model's own table
    pub fn new(engine: Engine) -> Self {
        let table = engine.table_name::<M>();
        Self::for_table(engine, table)
    }

    /// Repository over a specific physical table sharing the model's columns,
    /// such as one part of a partitioned model
    pub fn for_table(engine: Engine, table: impl Into<String>) -> Self {
        Self {
            engine,
            table: table.into(),
            _model: PhantomData,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Physical table this repository reads and writes
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Repository for another model on the same handle
    ///
    /// Inside a transaction the returned repository joins it.
    pub fn rebind<N: Model>(&self) -> Repository<N> {
        Repository::new(self.engine.clone())
    }

    fn target(&self, operation: Operation) -> Target<'_> {
        Target::new(&self.table, operation)
    }

    fn primary_key() -> Result<&'static Column> {
        M::primary_key()
            .ok_or_else(|| Error::validation(format!("model {} has no primary key", M::NAME)))
    }

    /// Insert records in batches; returns rows affected
    pub async fn create(&self, records: &[M]) -> Result<u64> {
        self.insert(records, false).await
    }

    /// Insert records, silently skipping rows that violate a unique constraint
    ///
    /// Of two conflicting rows in one call the first one is kept.
    pub async fn create_ignoring_conflicts(&self, records: &[M]) -> Result<u64> {
        self.insert(records, true).await
    }

    async fn insert(&self, records: &[M], ignore_conflicts: bool) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let batches: Vec<&[M]> = records.chunks(self.engine.batch_size()).collect();
        if batches.len() == 1 {
            return self.insert_batch(batches[0], ignore_conflicts).await;
        }

        self.transaction(|repo| async move {
            let mut affected = 0;
            for batch in batches {
                affected += repo.insert_batch(batch, ignore_conflicts).await?;
            }
            Ok::<u64, Error>(affected)
        })
        .await
    }

    async fn insert_batch(&self, batch: &[M], ignore_conflicts: bool) -> Result<u64> {
        let sql = self
            .engine
            .dialect()
            .insert(&self.table, M::COLUMNS, batch.len(), ignore_conflicts);

        let mut args = Vec::with_capacity(batch.len() * M::COLUMNS.len());
        for record in batch {
            for (column, value) in record.fields() {
                // Let the database assign auto-increment keys
                if column.auto_increment && value.is_zero() {
                    args.push(Value::Null);
                } else {
                    args.push(value);
                }
            }
        }

        let stmt = Statement::build(&sql, &args)?;
        self.engine.execute(self.target(Operation::Create), &stmt).await
    }

    /// Update `fields` of the row identified by the record's primary key
    ///
    /// An empty `fields` list updates every non-zero, non-key field.
    pub async fn update(&self, record: &M, fields: &[&str]) -> Result<u64> {
        let pk = Self::primary_key()?;
        let id = record
            .primary_key_value()
            .filter(|v| !v.is_zero())
            .ok_or_else(|| Error::validation(format!("update of {} without primary key", self.table)))?;

        let criteria = Criteria::new().and(Condition::eq(pk.name, id));
        self.update_where(record, fields, criteria).await
    }

    /// Update `fields` of every row matching `conditions`
    ///
    /// A non-zero primary key on the record narrows the update further. An
    /// update that would have no `WHERE` predicate is refused.
    pub async fn updates_by_condition<I, C>(&self, record: &M, conditions: I, fields: &[&str]) -> Result<u64>
    where
        I: IntoIterator<Item = C>,
        C: Into<Option<Condition>>,
    {
        let mut criteria = apply_conditions(Criteria::new(), conditions);
        if let (Some(pk), Some(id)) = (M::primary_key(), record.primary_key_value()) {
            if !id.is_zero() {
                criteria = criteria.and(Condition::eq(pk.name, id));
            }
        }
        if !criteria.has_predicates() {
            return Err(Error::validation(format!(
                "update of {} without conditions",
                self.table
            )));
        }
        self.update_where(record, fields, criteria).await
    }

    async fn update_where(&self, record: &M, fields: &[&str], criteria: Criteria) -> Result<u64> {
        let assignments = self.assignments(record, fields)?;

        let set: Vec<String> = assignments
            .iter()
            .map(|(column, _)| format!("{} = ?", quote_ident(column.name)))
            .collect();
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote_ident(&self.table),
            set.join(", "),
            criteria.where_clause()
        );

        let mut args: Vec<Value> = assignments.into_iter().map(|(_, value)| value).collect();
        args.extend_from_slice(criteria.args());

        let stmt = Statement::build(&sql, &args)?;
        self.engine.execute(self.target(Operation::Update), &stmt).await
    }

    fn assignments(&self, record: &M, fields: &[&str]) -> Result<Vec<(&'static Column, Value)>> {
        let assignments: Vec<(&'static Column, Value)> = if fields.is_empty() {
            record
                .non_zero_fields()
                .into_iter()
                .filter(|(column, _)| !column.primary_key)
                .collect()
        } else {
            let values = record.fields();
            let mut selected = Vec::with_capacity(fields.len());
            for field in fields {
                let (column, value) = values
                    .iter()
                    .find(|(column, _)| column.name.eq_ignore_ascii_case(field))
                    .ok_or_else(|| {
                        Error::validation(format!("unknown field {field} on {}", M::NAME))
                    })?;
                if column.primary_key {
                    return Err(Error::validation(format!(
                        "primary key {} cannot be updated",
                        column.name
                    )));
                }
                selected.push((*column, value.clone()));
            }
            selected
        };

        if assignments.is_empty() {
            return Err(Error::validation(format!("nothing to update on {}", self.table)));
        }
        Ok(assignments)
    }

    /// Delete the row with primary key `id`
    pub async fn delete(&self, id: impl Into<Value>) -> Result<u64> {
        let pk = Self::primary_key()?;
        self.delete_where(Criteria::new().and(Condition::eq(pk.name, id)))
            .await
    }

    /// Delete every row matching the record's non-zero fields
    ///
    /// An all-zero record is refused rather than emptying the table.
    pub async fn delete_by_match(&self, record: &M) -> Result<u64> {
        let criteria = Criteria::new().and(Condition::matching(record));
        if !criteria.has_predicates() {
            return Err(Error::validation(format!(
                "delete from {} without conditions",
                self.table
            )));
        }
        self.delete_where(criteria).await
    }

    async fn delete_where(&self, criteria: Criteria) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {}{}",
            quote_ident(&self.table),
            criteria.where_clause()
        );
        let stmt = Statement::build(&sql, criteria.args())?;
        self.engine.execute(self.target(Operation::Delete), &stmt).await
    }

    fn select_sql(&self, criteria: &Criteria, limit: Option<u64>) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}{}{}",
            self.engine.dialect().select_list(M::COLUMNS),
            quote_ident(&self.table),
            criteria.where_clause(),
            criteria.order_clause()
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql
    }

    async fn first(&self, criteria: Criteria) -> Result<M> {
        let criteria = match M::primary_key() {
            Some(pk) if !criteria.has_orders() => criteria.order_by(quote_ident(pk.name)),
            _ => criteria,
        };
        let stmt = Statement::build(&self.select_sql(&criteria, Some(1)), criteria.args())?;
        self.engine.fetch_one(self.target(Operation::Query), &stmt).await
    }

    async fn select(&self, criteria: Criteria, limit: Option<u64>) -> Result<Vec<M>> {
        let stmt = Statement::build(&self.select_sql(&criteria, limit), criteria.args())?;
        self.engine.fetch_all(self.target(Operation::Query), &stmt).await
    }

    /// Row with primary key `id`, or [`Error::NotFound`]
    pub async fn get_by_primary_key(&self, id: impl Into<Value>) -> Result<M> {
        let pk = Self::primary_key()?;
        self.first(Criteria::new().and(Condition::eq(pk.name, id)))
            .await
    }

    /// First row (by primary key) matching the record's non-zero fields
    pub async fn get_first_matching(&self, record: &M) -> Result<M> {
        self.first(Criteria::new().and(Condition::matching(record)))
            .await
    }

    /// First row matching `conditions` under `orders`, or [`Error::NotFound`]
    pub async fn get_first_by_condition<I, C>(&self, conditions: I, orders: &[&str]) -> Result<M>
    where
        I: IntoIterator<Item = C>,
        C: Into<Option<Condition>>,
    {
        let criteria = apply_order(apply_conditions(Criteria::new(), conditions), orders.iter().copied());
        self.first(criteria).await
    }

    /// Rows matching the record's non-zero fields; `None` means no limit
    pub async fn find(&self, record: &M, limit: Option<u64>, orders: &[&str]) -> Result<Vec<M>> {
        let criteria = apply_order(
            Criteria::new().and(Condition::matching(record)),
            orders.iter().copied(),
        );
        self.select(criteria, limit).await
    }

    /// Rows matching `conditions`; `None` means no limit
    pub async fn find_by_condition<I, C>(&self, conditions: I, limit: Option<u64>, orders: &[&str]) -> Result<Vec<M>>
    where
        I: IntoIterator<Item = C>,
        C: Into<Option<Condition>>,
    {
        let criteria = apply_order(apply_conditions(Criteria::new(), conditions), orders.iter().copied());
        self.select(criteria, limit).await
    }

    /// Every row matching the record's non-zero fields
    pub async fn find_all(&self, record: &M, orders: &[&str]) -> Result<Vec<M>> {
        self.find(record, None, orders).await
    }

    /// Every row matching `conditions`
    pub async fn find_all_by_condition<I, C>(&self, conditions: I, orders: &[&str]) -> Result<Vec<M>>
    where
        I: IntoIterator<Item = C>,
        C: Into<Option<Condition>>,
    {
        self.find_by_condition(conditions, None, orders).await
    }

    /// One page of rows matching the record's non-zero fields
    pub async fn page(&self, record: &M, page: &Page) -> Result<PageResult<M>> {
        let criteria = Criteria::new().and(Condition::matching(record));
        self.engine
            .paginate_criteria_on::<M, M>(&self.table, &criteria, page)
            .await
    }

    /// One page of rows matching `conditions`
    pub async fn page_by_condition<I, C>(&self, conditions: I, page: &Page) -> Result<PageResult<M>>
    where
        I: IntoIterator<Item = C>,
        C: Into<Option<Condition>>,
    {
        let criteria = apply_conditions(Criteria::new(), conditions);
        self.engine
            .paginate_criteria_on::<M, M>(&self.table, &criteria, page)
            .await
    }

    /// Number of rows matching the record's non-zero fields
    pub async fn count(&self, record: &M) -> Result<i64> {
        self.count_where(Criteria::new().and(Condition::matching(record)))
            .await
    }

    /// Number of rows matching `conditions`
    pub async fn count_by_condition<I, C>(&self, conditions: I) -> Result<i64>
    where
        I: IntoIterator<Item = C>,
        C: Into<Option<Condition>>,
    {
        self.count_where(apply_conditions(Criteria::new(), conditions))
            .await
    }

    async fn count_where(&self, criteria: Criteria) -> Result<i64> {
        let sql = format!(
            "SELECT count(1) FROM {}{}",
            quote_ident(&self.table),
            criteria.where_clause()
        );
        let stmt = Statement::build(&sql, criteria.args())?;
        self.engine.fetch_count(self.target(Operation::Count), &stmt).await
    }

    /// Run `f` with a repository bound to a transaction
    ///
    /// See [`Engine::transaction`] for commit, rollback and panic semantics.
    /// On a repository that is already transaction-bound, `f` joins the
    /// existing transaction.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Repository<M>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let table = self.table.clone();
        self.engine
            .transaction(|engine| f(Repository::for_table(engine, table)))
            .await
    }
}
