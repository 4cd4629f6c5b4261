//! Sessions: unit of work, identity map and association loading.
//!
//! A session owns one store connection. Within a session each persistent
//! row is represented by at most one in-memory instance. Changes are
//! written on `flush`, parents before children. Associations not covered by
//! the fetch plan are hydrated as deferred loads bound to the session; they
//! run one statement on first access and fail with `SessionClosed` after the
//! session is closed.

use std::cell::{RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use lazyrel_store::{Connection, Filter, Row, Statement, StatementResult, Value};
use serde::Serialize;

use crate::config::{FactoryConfig, MismatchPolicy};
use crate::entity::{Entity, EntityKey, ManagedEntity};
use crate::error::{OrmError, Result};
use crate::fetch_graph::FetchGraph;
use crate::lazy::DeferredLoad;
use crate::mapping::{AssociationDescriptor, AssociationKind, EntityDescriptor, Mapping};
use crate::query::Criteria;
use crate::resolver::FetchPlanResolver;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A managed instance plus the column values last written or read.
struct Tracked {
    entity: ManagedEntity,
    snapshot: Vec<Value>,
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatistics {
    /// Statements sent over the session's connection
    pub statements: u64,
    /// Instances in the identity map
    pub managed_entities: usize,
    /// Instances scheduled for insert
    pub pending_inserts: usize,
    /// Whether the session still holds its connection
    pub open: bool,
}

/// Read access to the identity map while a row is being hydrated, plus
/// the means to create deferred loads bound to the session.
pub struct HydrationContext<'a> {
    session: Weak<RefCell<SessionState>>,
    identity_map: &'a HashMap<EntityKey, Tracked>,
}

impl HydrationContext<'_> {
    /// The managed instance of `E` with this id, if the session has one.
    pub fn managed<E: Entity>(&self, id: i64) -> Option<Rc<RefCell<E>>> {
        self.identity_map
            .get(&EntityKey::new(E::NAME, id))
            .and_then(|tracked| E::from_managed(&tracked.entity))
    }

    /// Deferred load of `owner.association`, keyed by `key` (the owner id for
    /// collections, the foreign key for single references).
    pub fn deferred<T: 'static>(
        &self,
        owner: EntityKey,
        association: &'static str,
        key: i64,
        convert: fn(Vec<ManagedEntity>) -> T,
    ) -> DeferredLoad<T> {
        let session = self.session.clone();
        DeferredLoad::new(owner, association, move || {
            let state = session
                .upgrade()
                .ok_or_else(|| OrmError::closed(format!("cannot load {}.{}", owner, association)))?;
            let mut state = state.try_borrow_mut().map_err(|_| OrmError::SessionBusy)?;
            let loaded = state.load_association(owner.entity, association, key)?;
            Ok(convert(loaded))
        })
    }
}

pub(crate) struct SessionState {
    id: u64,
    self_ref: Weak<RefCell<SessionState>>,
    mapping: Mapping,
    policy: MismatchPolicy,
    auto_flush: bool,
    connection: Option<Connection>,
    statements_at_close: u64,
    identity_map: HashMap<EntityKey, Tracked>,
    pending: Vec<ManagedEntity>,
}

impl SessionState {
    fn connection(&mut self) -> Result<&mut Connection> {
        let id = self.id;
        self.connection
            .as_mut()
            .ok_or_else(|| OrmError::closed(format!("session {}", id)))
    }

    fn execute(&mut self, statement: &Statement) -> Result<StatementResult> {
        Ok(self.connection()?.execute(statement)?)
    }

    fn select(&mut self, entity: &EntityDescriptor, filter: Filter, limit: Option<usize>) -> Result<Vec<Row>> {
        let statement = Statement::Select {
            table: entity.table.to_string(),
            columns: entity.select_columns(),
            filter,
            limit,
        };
        Ok(self.execute(&statement)?.into_rows())
    }

    fn is_managed(&self, entity: &ManagedEntity) -> Result<bool> {
        Ok(match entity.key()? {
            Some(key) => self
                .identity_map
                .get(&key)
                .map_or(false, |tracked| tracked.entity.ptr_eq(entity)),
            None => false,
        })
    }

    fn is_pending(&self, entity: &ManagedEntity) -> bool {
        self.pending.iter().any(|p| p.ptr_eq(entity))
    }

    fn cascade_targets(&self, entity: &ManagedEntity) -> Result<Vec<ManagedEntity>> {
        let descriptor = self.mapping.entity(entity.entity_name())?;
        let mut targets = Vec::new();
        for assoc in descriptor.associations.iter().filter(|a| a.cascade) {
            targets.extend(entity.with(|e| e.cascade_targets(assoc.name))?);
        }
        Ok(targets)
    }

    /// Schedules `entity` and its transient cascade targets for insert.
    /// Nothing is scheduled if any of them fails the checks.
    fn persist(&mut self, entity: ManagedEntity) -> Result<()> {
        self.connection()?;
        let mut scheduled: Vec<ManagedEntity> = Vec::new();
        let mut visited: Vec<ManagedEntity> = Vec::new();
        let mut queue = vec![entity];

        while let Some(entity) = queue.pop() {
            if visited.iter().any(|v| v.ptr_eq(&entity)) {
                continue;
            }
            visited.push(entity.clone());

            if self.is_managed(&entity)? {
                queue.extend(self.cascade_targets(&entity)?);
                continue;
            }
            if self.is_pending(&entity) {
                continue;
            }
            if let Some(id) = entity.id()? {
                return Err(OrmError::DetachedEntity {
                    entity: entity.entity_name().to_string(),
                    id,
                });
            }
            if let Some(attribute) = entity.with(|e| e.missing_required())? {
                let descriptor = self.mapping.entity(entity.entity_name())?;
                let column = descriptor.attribute_named(attribute)?.column;
                return Err(OrmError::ConstraintViolation {
                    entity: descriptor.name.to_string(),
                    constraint: format!("{}_{}_not_null", descriptor.table, column),
                    detail: format!("{}.{} must be set", descriptor.name, attribute),
                });
            }

            queue.extend(self.cascade_targets(&entity)?);
            scheduled.push(entity);
        }

        tracing::trace!(session = self.id, scheduled = scheduled.len(), "persist");
        self.pending.extend(scheduled);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.connection()?;

        // Members added to cascading associations after persist.
        let roots: Vec<ManagedEntity> = self
            .pending
            .iter()
            .cloned()
            .chain(self.identity_map.values().map(|t| t.entity.clone()))
            .collect();
        for root in &roots {
            for target in self.cascade_targets(root)? {
                self.persist(target)?;
            }
        }

        let mapping = self.mapping.clone();
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(|e| mapping.insert_rank(e.entity_name()));

        for (index, entity) in pending.iter().enumerate() {
            if let Err(err) = self.insert(&mapping, entity) {
                self.pending = pending[index..].to_vec();
                return Err(err);
            }
        }
        let inserted = pending.len();

        let updated = self.flush_dirty(&mapping)?;
        tracing::debug!(session = self.id, inserted, updated, "flush");
        Ok(())
    }

    fn insert(&mut self, mapping: &Mapping, entity: &ManagedEntity) -> Result<()> {
        let descriptor = mapping.entity(entity.entity_name())?;
        let values = entity.with(|e| e.column_values())??;
        let id = self
            .connection()?
            .insert(descriptor.table, descriptor.insert_columns(), values.clone())?;
        entity.with_mut(|e| {
            e.assign_id(id)?;
            e.on_flushed(&values);
            Ok::<_, OrmError>(())
        })??;
        self.identity_map.insert(
            EntityKey::new(descriptor.name, id),
            Tracked {
                entity: entity.clone(),
                snapshot: values,
            },
        );
        Ok(())
    }

    /// Writes changed columns of managed instances. Returns the number of
    /// updated rows.
    fn flush_dirty(&mut self, mapping: &Mapping) -> Result<usize> {
        let mut keys: Vec<EntityKey> = self.identity_map.keys().copied().collect();
        keys.sort_by_key(|k| (mapping.insert_rank(k.entity), k.id));

        let mut updated = 0;
        for key in keys {
            let Some(tracked) = self.identity_map.get(&key) else {
                continue;
            };
            let descriptor = mapping.entity(key.entity)?;
            let current = tracked.entity.with(|e| e.column_values())??;
            let assignments: Vec<(String, Value)> = descriptor
                .attributes
                .iter()
                .zip(current.iter().zip(&tracked.snapshot))
                .filter(|(_, (now, before))| now != before)
                .map(|(attribute, (now, _))| (attribute.column.to_string(), now.clone()))
                .collect();
            if assignments.is_empty() {
                continue;
            }

            let entity = tracked.entity.clone();
            self.execute(&Statement::Update {
                table: descriptor.table.to_string(),
                id: key.id,
                assignments,
            })?;
            entity.with_mut(|e| e.on_flushed(&current))?;
            if let Some(tracked) = self.identity_map.get_mut(&key) {
                tracked.snapshot = current;
            }
            updated += 1;
        }
        Ok(updated)
    }

    /// Returns the managed instance for `row`, hydrating and registering it
    /// if the identity map has none.
    fn hydrate_row(&mut self, descriptor: &EntityDescriptor, row: &[Value]) -> Result<ManagedEntity> {
        let id = row
            .first()
            .and_then(Value::as_int)
            .ok_or_else(|| OrmError::Hydration {
                entity: descriptor.name.to_string(),
                detail: "row has no key".to_string(),
            })?;
        let key = EntityKey::new(descriptor.name, id);
        if let Some(tracked) = self.identity_map.get(&key) {
            return Ok(tracked.entity.clone());
        }

        let entity = {
            let ctx = HydrationContext {
                session: self.self_ref.clone(),
                identity_map: &self.identity_map,
            };
            (descriptor.hydrate)(row, &ctx)?
        };
        self.identity_map.insert(
            key,
            Tracked {
                entity: entity.clone(),
                snapshot: row[1..].to_vec(),
            },
        );
        Ok(entity)
    }

    /// Loads the targets of `assoc` for every key with one statement and
    /// groups them by key.
    fn fetch_association(
        &mut self,
        mapping: &Mapping,
        assoc: &AssociationDescriptor,
        keys: &[i64],
    ) -> Result<HashMap<i64, Vec<ManagedEntity>>> {
        let target = mapping.entity(assoc.target)?;
        let (column, group_index) = match assoc.kind {
            AssociationKind::OneToMany { mapped_by } => {
                let position = target
                    .attributes
                    .iter()
                    .position(|a| a.column == mapped_by)
                    .ok_or_else(|| OrmError::InvalidMapping(format!("no column {}.{}", target.table, mapped_by)))?;
                (mapped_by, position + 1)
            }
            AssociationKind::ManyToOne { .. } => ("id", 0),
        };

        let values = keys.iter().copied().map(Value::Int).collect();
        let rows = self.select(target, Filter::is_in(column, values), None)?;

        let mut grouped: HashMap<i64, Vec<ManagedEntity>> = HashMap::new();
        for row in &rows {
            let managed = self.hydrate_row(target, row)?;
            if let Some(key) = row.get(group_index).and_then(Value::as_int) {
                grouped.entry(key).or_default().push(managed);
            }
        }
        Ok(grouped)
    }

    /// Materializes `assoc` on every root that does not have it yet.
    fn load_eager(&mut self, mapping: &Mapping, roots: &[ManagedEntity], assoc: &AssociationDescriptor) -> Result<()> {
        let mut waiting = Vec::new();
        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        for root in roots {
            if root.with(|e| e.is_association_materialized(assoc.name))? {
                continue;
            }
            let key = root.with(|e| e.association_key(assoc.name))?;
            if let Some(key) = key {
                if seen.insert(key) {
                    keys.push(key);
                }
            }
            waiting.push((root, key));
        }
        if waiting.is_empty() {
            return Ok(());
        }

        let grouped = if keys.is_empty() {
            HashMap::new()
        } else {
            self.fetch_association(mapping, assoc, &keys)?
        };
        for (root, key) in waiting {
            let loaded = key
                .and_then(|k| grouped.get(&k).cloned())
                .unwrap_or_default();
            root.with_mut(|e| e.attach(assoc.name, loaded))??;
        }
        tracing::trace!(session = self.id, association = assoc.name, keys = keys.len(), "eager load");
        Ok(())
    }

    /// Runs a deferred load of `owner.association`.
    pub(crate) fn load_association(&mut self, owner: &str, association: &str, key: i64) -> Result<Vec<ManagedEntity>> {
        if self.connection.is_none() {
            return Err(OrmError::closed(format!("cannot load {}.{}", owner, association)));
        }
        let mapping = self.mapping.clone();
        let assoc = mapping.entity(owner)?.association_named(association)?;
        let mut grouped = self.fetch_association(&mapping, assoc, &[key])?;
        Ok(grouped.remove(&key).unwrap_or_default())
    }

    fn query(
        &mut self,
        entity: &str,
        filter: Filter,
        limit: Option<usize>,
        graph: Option<&FetchGraph>,
    ) -> Result<Vec<ManagedEntity>> {
        self.connection()?;
        if self.auto_flush {
            self.flush()?;
        }

        let mapping = self.mapping.clone();
        let descriptor = mapping.entity(entity)?;
        let plan = FetchPlanResolver::new(&mapping, self.policy).resolve(descriptor, graph)?;

        let rows = self.select(descriptor, filter, limit)?;
        let mut roots = Vec::with_capacity(rows.len());
        let mut seen = HashSet::new();
        for row in &rows {
            let managed = self.hydrate_row(descriptor, row)?;
            if let Some(key) = managed.key()? {
                if seen.insert(key) {
                    roots.push(managed);
                }
            }
        }

        for name in &plan.eager {
            let assoc = descriptor.association_named(name)?;
            self.load_eager(&mapping, &roots, assoc)?;
        }
        tracing::debug!(
            session = self.id,
            entity,
            results = roots.len(),
            eager = ?plan.eager,
            "query"
        );
        Ok(roots)
    }

    fn clear(&mut self) {
        tracing::debug!(
            session = self.id,
            detached = self.identity_map.len(),
            discarded = self.pending.len(),
            "clear"
        );
        self.identity_map.clear();
        self.pending.clear();
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.statements_at_close = connection.statement_count();
            self.clear();
            tracing::debug!(session = self.id, statements = self.statements_at_close, "session closed");
        }
    }

    fn statistics(&self) -> SessionStatistics {
        SessionStatistics {
            statements: self
                .connection
                .as_ref()
                .map_or(self.statements_at_close, Connection::statement_count),
            managed_entities: self.identity_map.len(),
            pending_inserts: self.pending.len(),
            open: self.connection.is_some(),
        }
    }
}

/// A unit of work over one store connection.
///
/// Not shareable across threads. Dropping the session closes it.
pub struct Session {
    id: u64,
    mapping: Mapping,
    state: Rc<RefCell<SessionState>>,
}

impl Session {
    pub(crate) fn open(connection: Connection, mapping: Mapping, config: &FactoryConfig) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session = id, connection = connection.id(), mapping = %mapping.id(), "session opened");
        let state = Rc::new_cyclic(|self_ref| {
            RefCell::new(SessionState {
                id,
                self_ref: self_ref.clone(),
                mapping: mapping.clone(),
                policy: config.mismatch_policy,
                auto_flush: config.auto_flush,
                connection: Some(connection),
                statements_at_close: 0,
                identity_map: HashMap::new(),
                pending: Vec::new(),
            })
        });
        Self { id, mapping, state }
    }

    fn state(&self) -> Result<RefMut<'_, SessionState>> {
        self.state.try_borrow_mut().map_err(|_| OrmError::SessionBusy)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The mapping instance this session was opened with.
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    /// Schedules a transient instance, and the transient members of its
    /// cascading associations, for insert at the next flush.
    ///
    /// Fails with `ConstraintViolation` if a required attribute is unset.
    pub fn persist<E: Entity>(&self, entity: &Rc<RefCell<E>>) -> Result<()> {
        self.state()?.persist(E::into_managed(Rc::clone(entity)))
    }

    /// Writes pending inserts, then changed columns of managed instances.
    pub fn flush(&self) -> Result<()> {
        self.state()?.flush()
    }

    /// Detaches every managed instance and discards pending inserts.
    pub fn clear(&self) -> Result<()> {
        self.state()?.clear();
        Ok(())
    }

    /// Whether `entity` is the managed instance for its row.
    pub fn contains<E: Entity>(&self, entity: &Rc<RefCell<E>>) -> bool {
        let managed = E::into_managed(Rc::clone(entity));
        self.state
            .try_borrow()
            .ok()
            .and_then(|state| state.is_managed(&managed).ok())
            .unwrap_or(false)
    }

    /// Instance of `E` with this id, from the identity map or the store.
    pub fn find<E: Entity>(&self, id: i64) -> Result<Option<Rc<RefCell<E>>>> {
        let mut state = self.state()?;
        state.connection()?;
        if let Some(tracked) = state.identity_map.get(&EntityKey::new(E::NAME, id)) {
            return Ok(E::from_managed(&tracked.entity));
        }
        let managed = state.query(E::NAME, Filter::eq("id", id), Some(1), None)?;
        Ok(managed.first().and_then(E::from_managed))
    }

    /// Instances of `E` matching `criteria`, each at most once.
    ///
    /// With a fetch graph of this session's mapping, the graph's associations
    /// are loaded before returning, one batched statement per association.
    /// A graph of another mapping instance does not apply; see
    /// [`MismatchPolicy`].
    pub fn query<E: Entity>(&self, criteria: &Criteria<E>, graph: Option<&FetchGraph>) -> Result<Vec<Rc<RefCell<E>>>> {
        let filter = criteria.to_filter(&self.mapping)?;
        let mut state = self.state()?;
        let managed = state.query(E::NAME, filter, criteria.max_rows(), graph)?;
        Ok(managed.iter().filter_map(E::from_managed).collect())
    }

    /// Empty fetch graph rooted at `E`, bound to this session's mapping.
    pub fn create_fetch_graph<E: Entity>(&self) -> Result<FetchGraph> {
        self.mapping.fetch_graph::<E>()
    }

    pub fn begin_transaction(&self) -> Result<()> {
        Ok(self.state()?.connection()?.begin()?)
    }

    /// Flushes, then commits the store transaction.
    pub fn commit(&self) -> Result<()> {
        let mut state = self.state()?;
        state.flush()?;
        Ok(state.connection()?.commit()?)
    }

    /// Rolls back the store transaction and detaches every instance.
    pub fn rollback(&self) -> Result<()> {
        let mut state = self.state()?;
        state.connection()?.rollback();
        state.clear();
        Ok(())
    }

    /// Whether a store transaction is open. `false` once closed.
    pub fn in_transaction(&self) -> Result<bool> {
        let state = self.state.try_borrow().map_err(|_| OrmError::SessionBusy)?;
        Ok(state.connection.as_ref().map_or(false, Connection::in_transaction))
    }

    /// Releases the connection. Deferred loads of instances from this
    /// session fail from now on.
    pub fn close(&self) -> Result<()> {
        self.state()?.close();
        Ok(())
    }

    pub fn is_open(&self) -> Result<bool> {
        let state = self.state.try_borrow().map_err(|_| OrmError::SessionBusy)?;
        Ok(state.connection.is_some())
    }

    pub fn statistics(&self) -> Result<SessionStatistics> {
        let state = self.state.try_borrow().map_err(|_| OrmError::SessionBusy)?;
        Ok(state.statistics())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.close();
        }
    }
}
