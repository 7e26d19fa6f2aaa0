// workflow/src/orchestrator/orchestrator.rs

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use uuid::Uuid;

use models::{
    Actor, EntityKey, EntityType, Invoice, LabOrder, LabTest, MedicalRecord, Medicine, NewVisit, PaymentStatus,
    Prescription, Referral, ReferralStatus, StoredEntity, ValidationError, Visit, VisitStatus,
};
use security::{actor_from_token, authorize_visit, issue_token, AuthResult, Capability, CapabilityTable, SecurityError};

use super::actions::{
    Action, Command, CreateLabOrder, CreatePrescription, CreateReferral, EnterLabResult, InvoiceTransition,
    LabOrderTransition, PrescriptionTransition, RecordPayment, UpsertMedicalRecord, VisitTransition,
};
use super::delta::EntityDelta;
use super::overview::{available_actions, AvailableAction, VisitOverview};
use crate::billing::{compute_invoice, PriceBook};
use crate::config::{CanceledInvoicePolicy, WorkflowConfig};
use crate::errors::{DomainError, DomainResult, StorageError};
use crate::state_machine::{
    invoice as invoice_sm, lab_order as lab_order_sm, prescription as prescription_sm, referral as referral_sm,
    visit as visit_sm,
};
use crate::storage_engine::{create_storage, fetch, fetch_all, DataAccess, InMemoryStorage, ListFilter, WriteBatch};

/// Writes of one action, with the status each record had before it.
#[derive(Default)]
struct ChangeSet {
    batch: WriteBatch,
    previous: Vec<(EntityKey, Option<String>)>,
}

impl ChangeSet {
    fn put<T: StoredEntity>(&mut self, record: T, expected_version: u64, previous_status: Option<&str>) {
        self.previous.push((record.key(), previous_status.map(str::to_string)));
        self.batch.put(record.into_entity(), expected_version);
    }

    fn guard(&mut self, key: EntityKey, expected_version: u64) {
        self.batch.guard(key, expected_version);
    }
}

/// Invoice write produced by a recompute.
struct InvoiceUpdate {
    invoice: Invoice,
    expected_version: u64,
    previous_status: Option<&'static str>,
}

impl InvoiceUpdate {
    fn stage(self, changes: &mut ChangeSet) {
        changes.put(self.invoice, self.expected_version, self.previous_status);
    }
}

/// Children of one visit as they will look after the current action.
struct VisitChildren {
    record: Option<MedicalRecord>,
    lab_orders: Vec<LabOrder>,
    prescriptions: Vec<Prescription>,
}

impl VisitChildren {
    fn replace_lab_order(&mut self, order: &LabOrder) {
        match self.lab_orders.iter_mut().find(|o| o.id == order.id) {
            Some(slot) => *slot = order.clone(),
            None => self.lab_orders.push(order.clone()),
        }
    }

    fn replace_prescription(&mut self, prescription: &Prescription) {
        match self.prescriptions.iter_mut().find(|p| p.id == prescription.id) {
            Some(slot) => *slot = prescription.clone(),
            None => self.prescriptions.push(prescription.clone()),
        }
    }
}

fn expect_version(entity: EntityType, id: Uuid, expected: u64, actual: u64) -> DomainResult<()> {
    if expected != actual {
        return Err(DomainError::ConcurrentModification { entity, id, expected, actual });
    }
    Ok(())
}

fn expect_visit_version(visit: &Visit, expected: Option<u64>) -> DomainResult<()> {
    match expected {
        Some(expected) => expect_version(EntityType::Visit, visit.id, expected, visit.version),
        None => Ok(()),
    }
}

/// The single entry point of the clinic workflow.
///
/// Every action runs authorize → decode → load → transition → recompute →
/// commit, and either returns the [`EntityDelta`] of one atomic batch or a
/// [`DomainError`] with nothing written.
pub struct WorkflowOrchestrator {
    store: Arc<dyn DataAccess>,
    capabilities: CapabilityTable,
    config: WorkflowConfig,
}

impl WorkflowOrchestrator {
    pub fn new(store: Arc<dyn DataAccess>, capabilities: CapabilityTable, config: WorkflowConfig) -> Self {
        WorkflowOrchestrator { store, capabilities, config }
    }

    /// Standard capability table and default configuration over `store`.
    pub fn with_defaults(store: Arc<dyn DataAccess>) -> Self {
        Self::new(store, CapabilityTable::standard(), WorkflowConfig::default())
    }

    pub fn in_memory() -> Self {
        Self::with_defaults(Arc::new(InMemoryStorage::new()))
    }

    /// Opens the configured store and capability table.
    pub fn from_config(config: WorkflowConfig) -> Result<Self> {
        let store = create_storage(&config.storage).context("Failed to create workflow storage")?;
        let capabilities = match &config.capabilities_file {
            Some(path) => CapabilityTable::from_yaml_file(path)
                .with_context(|| format!("Failed to load capability table from {:?}", path))?,
            None => CapabilityTable::standard(),
        };
        info!("Workflow orchestrator ready on {} storage", store.get_type());
        Ok(Self::new(store, capabilities, config))
    }

    pub fn store(&self) -> &Arc<dyn DataAccess> {
        &self.store
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub fn authorize(&self, actor: &Actor, capability: Capability) -> AuthResult {
        self.capabilities.authorize(actor, capability)
    }

    pub fn issue_token(&self, actor: &Actor) -> Result<String, SecurityError> {
        issue_token(actor, &self.config.auth.jwt_secret, self.config.auth.token_ttl())
    }

    pub fn authenticate(&self, token: &str) -> Result<Actor, SecurityError> {
        actor_from_token(token, &self.config.auth.jwt_secret)
    }

    /// Runs `action` with a JSON payload. Authorization happens before the
    /// payload is looked at.
    pub async fn perform(&self, actor: &Actor, action: Action, payload: Value) -> DomainResult<EntityDelta> {
        self.require(actor, action.capability())?;
        let command = Command::parse(action, payload).map_err(|err| {
            warn!("{} by {} rejected: {}", action, actor, err);
            DomainError::from(err)
        })?;
        self.dispatch(actor, command).await
    }

    /// `perform` with the action given by name.
    pub async fn perform_named(&self, actor: &Actor, action: &str, payload: Value) -> DomainResult<EntityDelta> {
        let action: Action = action.parse()?;
        self.perform(actor, action, payload).await
    }

    /// Typed entry point for in-process callers.
    pub async fn execute(&self, actor: &Actor, command: Command) -> DomainResult<EntityDelta> {
        self.require(actor, command.action().capability())?;
        self.dispatch(actor, command).await
    }

    async fn dispatch(&self, actor: &Actor, command: Command) -> DomainResult<EntityDelta> {
        let action = command.action();
        let now = Utc::now();
        let result = match command {
            Command::RegisterVisit(new) => self.register_visit(actor, new, now).await,
            Command::StartExam(t) => self.start_exam(actor, t, now).await,
            Command::CompleteVisit(t) => self.complete_visit(actor, t, now).await,
            Command::CancelVisit(t) => self.cancel_visit(actor, t, now).await,
            Command::UpsertMedicalRecord(p) => self.upsert_medical_record(actor, p, now).await,
            Command::CreateLabOrder(p) => self.create_lab_order(actor, p, now).await,
            Command::StartLabOrder(t) => self.start_lab_order(actor, t, now).await,
            Command::EnterLabResult(p) => self.enter_lab_result(actor, p, now).await,
            Command::CancelLabOrder(t) => self.cancel_lab_order(actor, t, now).await,
            Command::CreatePrescription(p) => self.create_prescription(actor, p, now).await,
            Command::StartPrescription(t) => self.start_prescription(actor, t, now).await,
            Command::CompletePrescription(t) => self.complete_prescription(actor, t, now).await,
            Command::CancelPrescription(t) => self.cancel_prescription(actor, t, now).await,
            Command::CreateReferral(p) => self.create_referral(actor, p, now).await,
            Command::RecordPayment(p) => self.record_payment(actor, p, now).await,
            Command::CancelInvoice(t) => self.cancel_invoice(actor, t, now).await,
        };

        match &result {
            Ok(delta) if delta.is_noop() => info!("{} by {} on {}: nothing to change", action, actor, delta.target),
            Ok(delta) => info!("{} by {} on {}: {} record(s) written", action, actor, delta.target, delta.changes.len()),
            Err(err) if err.is_conflict() => warn!("{} by {} lost a concurrent update: {}", action, actor, err),
            Err(DomainError::Storage(msg)) => warn!("{} by {} failed in storage: {}", action, actor, msg),
            Err(err) => info!("{} by {} rejected: {}", action, actor, err),
        }
        result
    }

    // Authorization

    fn denied(&self, actor: &Actor, capability: Capability, result: AuthResult) -> DomainResult<()> {
        match result {
            AuthResult::Allowed => Ok(()),
            AuthResult::Denied { fallback, reason } => {
                warn!("{} denied {} ({:?}), fallback {}", actor, capability, reason, fallback);
                Err(DomainError::AuthorizationDenied { capability: capability.to_string(), fallback, reason })
            }
        }
    }

    fn require(&self, actor: &Actor, capability: Capability) -> DomainResult<()> {
        self.denied(actor, capability, self.capabilities.authorize(actor, capability))
    }

    fn require_on_visit(&self, actor: &Actor, capability: Capability, visit: &Visit) -> DomainResult<()> {
        self.denied(actor, capability, authorize_visit(&self.capabilities, actor, capability, visit))
    }

    fn may_read(&self, actor: &Actor, capability: Capability, visit: &Visit) -> bool {
        authorize_visit(&self.capabilities, actor, capability, visit).is_allowed()
    }

    // Loading

    async fn load<T: StoredEntity>(&self, id: Uuid) -> DomainResult<T> {
        Ok(fetch::<T>(self.store.as_ref(), id).await?)
    }

    async fn find<T: StoredEntity>(&self, id: Uuid) -> DomainResult<Option<T>> {
        match fetch::<T>(self.store.as_ref(), id).await {
            Ok(record) => Ok(Some(record)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn children_of<T: StoredEntity>(&self, visit_id: Uuid) -> DomainResult<Vec<T>> {
        Ok(fetch_all::<T>(self.store.as_ref(), &ListFilter::by_visit(visit_id)).await?)
    }

    async fn load_children(&self, visit_id: Uuid) -> DomainResult<VisitChildren> {
        Ok(VisitChildren {
            record: self.find::<MedicalRecord>(visit_id).await?,
            lab_orders: self.children_of::<LabOrder>(visit_id).await?,
            prescriptions: self.children_of::<Prescription>(visit_id).await?,
        })
    }

    async fn load_catalog<T: StoredEntity>(&self, id: Uuid) -> DomainResult<T> {
        self.find::<T>(id).await?.ok_or_else(|| {
            DomainError::from(ValidationError::UnknownCatalogItem { kind: T::ENTITY_TYPE.to_string(), id })
        })
    }

    async fn price_book(&self) -> DomainResult<PriceBook> {
        let lab_tests = fetch_all::<LabTest>(self.store.as_ref(), &ListFilter::default()).await?;
        let medicines = fetch_all::<Medicine>(self.store.as_ref(), &ListFilter::default()).await?;
        Ok(PriceBook::new(lab_tests, medicines))
    }

    async fn persist(&self, action: Action, visit_id: Uuid, target: EntityKey, changes: ChangeSet) -> DomainResult<EntityDelta> {
        let ChangeSet { batch, previous } = changes;
        let ops = batch.len();
        let stored = self.store.commit(batch).await?;
        debug!("{} committed {} ops for visit {}", action, ops, visit_id);
        Ok(EntityDelta::from_stored(action, visit_id, target, &stored, &previous))
    }

    /// Recomputes the visit's bill. Creates the invoice the first time the
    /// total is positive and freezes it when `freeze` is set. Returns `None`
    /// when nothing needs writing.
    async fn sync_invoice(
        &self,
        visit: &Visit,
        children: &VisitChildren,
        freeze: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<InvoiceUpdate>> {
        let prices = self.price_book().await?;
        let totals = compute_invoice(
            visit,
            children.record.as_ref(),
            &children.lab_orders,
            &children.prescriptions,
            &prices,
            self.config.consultation_fee,
        );

        let (mut invoice, expected_version, previous_status) = match self.find::<Invoice>(visit.id).await? {
            Some(invoice) => {
                let version = invoice.version;
                let status = invoice.payment_status.as_str();
                (invoice, version, Some(status))
            }
            None if totals.total_amount.is_zero() => return Ok(None),
            None => (Invoice::new(visit.id, now), 0, None),
        };

        let mut changed = invoice_sm::apply_totals(&mut invoice, totals, now);
        if freeze {
            changed |= invoice_sm::freeze(&mut invoice, now);
        }
        if !changed && expected_version != 0 {
            return Ok(None);
        }
        debug!("Invoice {} of visit {} now totals {}", invoice.id, visit.id, invoice.total_amount);
        Ok(Some(InvoiceUpdate { invoice, expected_version, previous_status }))
    }

    // Visit

    async fn register_visit(&self, actor: &Actor, new: NewVisit, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let visit = visit_sm::register(new, Some(actor.id()), now, self.config.grace_window())?;
        let (visit_id, target) = (visit.id, visit.key());
        let mut changes = ChangeSet::default();
        changes.put(visit, 0, None);
        self.persist(Action::VisitRegister, visit_id, target, changes).await
    }

    async fn start_exam(&self, actor: &Actor, t: VisitTransition, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let mut visit: Visit = self.load(t.visit_id).await?;
        self.require_on_visit(actor, Capability::VisitStartExam, &visit)?;
        // A retry of a start that already landed holds the old version.
        if visit.status == VisitStatus::Examining {
            return Ok(EntityDelta::unchanged(Action::VisitStartExam, visit.id, visit.key()));
        }
        expect_version(EntityType::Visit, visit.id, t.expected_version, visit.version)?;

        let previous = visit.status;
        visit_sm::start_exam(&mut visit, now)?;
        let (visit_id, target, version) = (visit.id, visit.key(), visit.version);
        let mut changes = ChangeSet::default();
        changes.put(visit, version, Some(previous.as_str()));
        self.persist(Action::VisitStartExam, visit_id, target, changes).await
    }

    async fn complete_visit(&self, actor: &Actor, t: VisitTransition, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let mut visit: Visit = self.load(t.visit_id).await?;
        self.require_on_visit(actor, Capability::VisitComplete, &visit)?;
        expect_version(EntityType::Visit, visit.id, t.expected_version, visit.version)?;

        let children = self.load_children(visit.id).await?;
        let previous = visit.status;
        visit_sm::complete(&mut visit, &children.lab_orders, &children.prescriptions, self.config.completion_policy, now)?;

        let mut changes = ChangeSet::default();
        if let Some(update) = self.sync_invoice(&visit, &children, true, now).await? {
            update.stage(&mut changes);
        }
        let (visit_id, target, version) = (visit.id, visit.key(), visit.version);
        changes.put(visit, version, Some(previous.as_str()));
        self.persist(Action::VisitComplete, visit_id, target, changes).await
    }

    /// Cancels the visit together with its open children. The invoice is
    /// voided unless money was taken and the policy retains paid invoices.
    async fn cancel_visit(&self, actor: &Actor, t: VisitTransition, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let mut visit: Visit = self.load(t.visit_id).await?;
        self.require_on_visit(actor, Capability::VisitCancel, &visit)?;
        expect_version(EntityType::Visit, visit.id, t.expected_version, visit.version)?;

        let previous = visit.status;
        visit_sm::cancel(&mut visit, now)?;
        let (visit_id, target, version) = (visit.id, visit.key(), visit.version);
        let mut changes = ChangeSet::default();
        changes.put(visit, version, Some(previous.as_str()));

        for mut order in self.children_of::<LabOrder>(visit_id).await? {
            if order.status.is_terminal() {
                continue;
            }
            let (prior, version) = (order.status.as_str(), order.version);
            lab_order_sm::cancel(&mut order, now)?;
            changes.put(order, version, Some(prior));
        }
        for mut prescription in self.children_of::<Prescription>(visit_id).await? {
            if prescription.status.is_terminal() {
                continue;
            }
            let (prior, version) = (prescription.status.as_str(), prescription.version);
            prescription_sm::cancel(&mut prescription, now)?;
            changes.put(prescription, version, Some(prior));
        }
        for mut referral in self.children_of::<Referral>(visit_id).await? {
            if referral.status != ReferralStatus::Pending {
                continue;
            }
            let (prior, version) = (referral.status.as_str(), referral.version);
            referral_sm::cancel(&mut referral, now)?;
            changes.put(referral, version, Some(prior));
        }

        if let Some(mut invoice) = self.find::<Invoice>(visit_id).await? {
            if invoice.payment_status != PaymentStatus::Canceled {
                let (prior, version) = (invoice.payment_status.as_str(), invoice.version);
                let void = match self.config.canceled_visit_invoice {
                    CanceledInvoicePolicy::AlwaysCancel => true,
                    CanceledInvoicePolicy::RetainIfPaid => invoice.amount_paid.is_zero(),
                };
                if void {
                    invoice_sm::void(&mut invoice, now);
                    changes.put(invoice, version, Some(prior));
                } else {
                    info!("Visit {} canceled, keeping invoice {} with {} paid", visit_id, invoice.id, invoice.amount_paid);
                }
            }
        }

        self.persist(Action::VisitCancel, visit_id, target, changes).await
    }

    // Medical record

    async fn upsert_medical_record(&self, actor: &Actor, p: UpsertMedicalRecord, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let visit: Visit = self.load(p.visit_id).await?;
        self.require_on_visit(actor, Capability::MedicalRecordWrite, &visit)?;
        expect_visit_version(&visit, p.expected_visit_version)?;
        if visit.status != VisitStatus::Examining {
            return Err(DomainError::VisitNotActive {
                visit_id: visit.id,
                current: visit.status,
                required: VisitStatus::Examining.as_str().into(),
            });
        }

        let mut children = self.load_children(visit.id).await?;
        let (record, expected_version) = match children.record.take() {
            Some(mut record) => {
                let expected = p.expected_version.unwrap_or(0);
                expect_version(EntityType::MedicalRecord, record.id, expected, record.version)?;
                record.apply(p.fields, now);
                (record, expected)
            }
            None => {
                if let Some(expected) = p.expected_version.filter(|v| *v != 0) {
                    return Err(DomainError::ConcurrentModification {
                        entity: EntityType::MedicalRecord,
                        id: visit.id,
                        expected,
                        actual: 0,
                    });
                }
                (MedicalRecord::new(visit.id, p.fields, now), 0)
            }
        };
        children.record = Some(record.clone());

        let target = record.key();
        let mut changes = ChangeSet::default();
        changes.put(record, expected_version, None);
        changes.guard(visit.key(), visit.version);
        if let Some(update) = self.sync_invoice(&visit, &children, false, now).await? {
            update.stage(&mut changes);
        }
        self.persist(Action::MedicalRecordUpsert, visit.id, target, changes).await
    }

    // Lab orders

    async fn create_lab_order(&self, actor: &Actor, p: CreateLabOrder, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let visit: Visit = self.load(p.visit_id).await?;
        self.require_on_visit(actor, Capability::LabOrderCreate, &visit)?;
        expect_visit_version(&visit, p.expected_visit_version)?;

        let lab_test: LabTest = self.load_catalog(p.lab_test_id).await?;
        let order = lab_order_sm::create(&visit, &lab_test, p.notes, now)?;

        let target = order.key();
        let mut changes = ChangeSet::default();
        changes.put(order, 0, None);
        changes.guard(visit.key(), visit.version);
        self.persist(Action::LabOrderCreate, visit.id, target, changes).await
    }

    /// Loads a lab order with its visit and runs the shared checks.
    async fn lab_order_context(
        &self,
        actor: &Actor,
        capability: Capability,
        lab_order_id: Uuid,
        expected_version: u64,
        expected_visit_version: Option<u64>,
    ) -> DomainResult<(LabOrder, Visit)> {
        let order: LabOrder = self.load(lab_order_id).await?;
        let visit: Visit = self.load(order.visit_id).await?;
        self.require_on_visit(actor, capability, &visit)?;
        expect_visit_version(&visit, expected_visit_version)?;
        expect_version(EntityType::LabOrder, order.id, expected_version, order.version)?;
        Ok((order, visit))
    }

    async fn start_lab_order(&self, actor: &Actor, t: LabOrderTransition, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let (mut order, visit) = self
            .lab_order_context(actor, Capability::LabOrderStart, t.lab_order_id, t.expected_version, t.expected_visit_version)
            .await?;
        let prior = order.status.as_str();
        lab_order_sm::start(&mut order, &visit, actor.id(), now)?;

        let target = order.key();
        let mut changes = ChangeSet::default();
        changes.put(order, t.expected_version, Some(prior));
        changes.guard(visit.key(), visit.version);
        self.persist(Action::LabOrderStart, visit.id, target, changes).await
    }

    async fn enter_lab_result(&self, actor: &Actor, p: EnterLabResult, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let (mut order, visit) = self
            .lab_order_context(actor, Capability::LabOrderEnterResult, p.lab_order_id, p.expected_version, p.expected_visit_version)
            .await?;
        let prior = order.status.as_str();
        lab_order_sm::enter_result(&mut order, &visit, p.result, actor.id(), now)?;

        let mut children = self.load_children(visit.id).await?;
        children.replace_lab_order(&order);

        let target = order.key();
        let mut changes = ChangeSet::default();
        changes.put(order, p.expected_version, Some(prior));
        changes.guard(visit.key(), visit.version);
        if let Some(update) = self.sync_invoice(&visit, &children, false, now).await? {
            update.stage(&mut changes);
        }
        self.persist(Action::LabOrderEnterResult, visit.id, target, changes).await
    }

    async fn cancel_lab_order(&self, actor: &Actor, t: LabOrderTransition, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let (mut order, visit) = self
            .lab_order_context(actor, Capability::LabOrderCancel, t.lab_order_id, t.expected_version, t.expected_visit_version)
            .await?;
        let prior = order.status.as_str();
        lab_order_sm::cancel(&mut order, now)?;

        let target = order.key();
        let mut changes = ChangeSet::default();
        changes.put(order, t.expected_version, Some(prior));
        changes.guard(visit.key(), visit.version);
        self.persist(Action::LabOrderCancel, visit.id, target, changes).await
    }

    // Prescriptions

    async fn create_prescription(&self, actor: &Actor, p: CreatePrescription, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let visit: Visit = self.load(p.visit_id).await?;
        self.require_on_visit(actor, Capability::PrescriptionCreate, &visit)?;
        expect_visit_version(&visit, p.expected_visit_version)?;

        let existing = self.children_of::<Prescription>(visit.id).await?;
        let prescription = prescription_sm::create(&visit, p.items, p.notes, &existing, now)?;
        for item in &prescription.items {
            self.load_catalog::<Medicine>(item.medicine_id).await?;
        }

        let target = prescription.key();
        let mut changes = ChangeSet::default();
        changes.put(prescription, 0, None);
        changes.guard(visit.key(), visit.version);
        self.persist(Action::PrescriptionCreate, visit.id, target, changes).await
    }

    async fn prescription_context(
        &self,
        actor: &Actor,
        capability: Capability,
        t: &PrescriptionTransition,
    ) -> DomainResult<(Prescription, Visit)> {
        let prescription: Prescription = self.load(t.prescription_id).await?;
        let visit: Visit = self.load(prescription.visit_id).await?;
        self.require_on_visit(actor, capability, &visit)?;
        expect_visit_version(&visit, t.expected_visit_version)?;
        expect_version(EntityType::Prescription, prescription.id, t.expected_version, prescription.version)?;
        Ok((prescription, visit))
    }

    async fn start_prescription(&self, actor: &Actor, t: PrescriptionTransition, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let (mut prescription, visit) = self.prescription_context(actor, Capability::PrescriptionStart, &t).await?;
        let prior = prescription.status.as_str();
        prescription_sm::start(&mut prescription, &visit, actor.id(), now)?;

        let target = prescription.key();
        let mut changes = ChangeSet::default();
        changes.put(prescription, t.expected_version, Some(prior));
        changes.guard(visit.key(), visit.version);
        self.persist(Action::PrescriptionStart, visit.id, target, changes).await
    }

    async fn complete_prescription(&self, actor: &Actor, t: PrescriptionTransition, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let (mut prescription, visit) = self.prescription_context(actor, Capability::PrescriptionComplete, &t).await?;
        let prior = prescription.status.as_str();
        prescription_sm::complete(&mut prescription, &visit, actor.id(), now)?;

        let mut children = self.load_children(visit.id).await?;
        children.replace_prescription(&prescription);

        let target = prescription.key();
        let mut changes = ChangeSet::default();
        changes.put(prescription, t.expected_version, Some(prior));
        changes.guard(visit.key(), visit.version);
        if let Some(update) = self.sync_invoice(&visit, &children, false, now).await? {
            update.stage(&mut changes);
        }
        self.persist(Action::PrescriptionComplete, visit.id, target, changes).await
    }

    async fn cancel_prescription(&self, actor: &Actor, t: PrescriptionTransition, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let (mut prescription, visit) = self.prescription_context(actor, Capability::PrescriptionCancel, &t).await?;
        let prior = prescription.status.as_str();
        prescription_sm::cancel(&mut prescription, now)?;

        let target = prescription.key();
        let mut changes = ChangeSet::default();
        changes.put(prescription, t.expected_version, Some(prior));
        changes.guard(visit.key(), visit.version);
        self.persist(Action::PrescriptionCancel, visit.id, target, changes).await
    }

    // Referrals

    async fn create_referral(&self, actor: &Actor, p: CreateReferral, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let visit: Visit = self.load(p.visit_id).await?;
        self.require_on_visit(actor, Capability::ReferralCreate, &visit)?;
        expect_visit_version(&visit, p.expected_visit_version)?;
        let referral = referral_sm::create(&visit, p.details, now)?;

        let target = referral.key();
        let mut changes = ChangeSet::default();
        changes.put(referral, 0, None);
        changes.guard(visit.key(), visit.version);
        self.persist(Action::ReferralCreate, visit.id, target, changes).await
    }

    // Invoice

    async fn invoice_context(
        &self,
        actor: &Actor,
        capability: Capability,
        invoice_id: Uuid,
        expected_version: u64,
    ) -> DomainResult<(Invoice, Visit)> {
        let invoice: Invoice = self.load(invoice_id).await?;
        let visit: Visit = self.load(invoice.visit_id).await?;
        self.require_on_visit(actor, capability, &visit)?;
        expect_version(EntityType::Invoice, invoice.id, expected_version, invoice.version)?;
        Ok((invoice, visit))
    }

    async fn record_payment(&self, actor: &Actor, p: RecordPayment, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let (mut invoice, _) = self
            .invoice_context(actor, Capability::InvoiceRecordPayment, p.invoice_id, p.expected_version)
            .await?;
        let prior = invoice.payment_status.as_str();
        invoice_sm::record_payment(&mut invoice, p.amount, p.method, actor.id(), now)?;

        let (visit_id, target) = (invoice.visit_id, invoice.key());
        let mut changes = ChangeSet::default();
        changes.put(invoice, p.expected_version, Some(prior));
        self.persist(Action::InvoiceRecordPayment, visit_id, target, changes).await
    }

    async fn cancel_invoice(&self, actor: &Actor, t: InvoiceTransition, now: DateTime<Utc>) -> DomainResult<EntityDelta> {
        let (mut invoice, visit) = self
            .invoice_context(actor, Capability::InvoiceCancel, t.invoice_id, t.expected_version)
            .await?;
        let children = self.load_children(visit.id).await?;
        let open = visit_sm::open_children(visit.id, &children.lab_orders, &children.prescriptions);
        let prior = invoice.payment_status.as_str();
        invoice_sm::cancel(&mut invoice, &visit, &open, now)?;

        let target = invoice.key();
        let mut changes = ChangeSet::default();
        changes.put(invoice, t.expected_version, Some(prior));
        changes.guard(visit.key(), visit.version);
        self.persist(Action::InvoiceCancel, visit.id, target, changes).await
    }

    // Read side

    /// The visit with every child the actor may read. Children are ordered
    /// by creation time. `open_children` lists every non-terminal child,
    /// including those in hidden sections.
    pub async fn visit_overview(&self, actor: &Actor, visit_id: Uuid) -> DomainResult<VisitOverview> {
        let visit: Visit = self.load(visit_id).await?;
        self.require_on_visit(actor, Capability::VisitRead, &visit)?;

        let VisitChildren { record, mut lab_orders, mut prescriptions } = self.load_children(visit.id).await?;
        let open_children = visit_sm::open_children(visit.id, &lab_orders, &prescriptions);

        let medical_record = record.filter(|_| self.may_read(actor, Capability::MedicalRecordRead, &visit));
        if self.may_read(actor, Capability::LabOrderRead, &visit) {
            lab_orders.sort_by_key(|o| o.created_at);
        } else {
            lab_orders.clear();
        }
        if self.may_read(actor, Capability::PrescriptionRead, &visit) {
            prescriptions.sort_by_key(|p| p.created_at);
        } else {
            prescriptions.clear();
        }
        let referrals = if self.may_read(actor, Capability::ReferralRead, &visit) {
            let mut referrals = self.children_of::<Referral>(visit.id).await?;
            referrals.sort_by_key(|r| r.created_at);
            referrals
        } else {
            Vec::new()
        };
        let invoice = if self.may_read(actor, Capability::InvoiceRead, &visit) {
            self.find::<Invoice>(visit.id).await?
        } else {
            None
        };

        Ok(VisitOverview { visit, medical_record, lab_orders, prescriptions, referrals, invoice, open_children })
    }

    pub fn available_actions(&self, actor: &Actor, overview: &VisitOverview) -> Vec<AvailableAction> {
        available_actions(&self.capabilities, self.config.completion_policy, actor, overview)
    }

    /// Visits of one patient or doctor, newest first, under the same
    /// ownership rules as `visit_overview`.
    pub async fn list_visits(&self, actor: &Actor, filter: &ListFilter) -> DomainResult<Vec<Visit>> {
        self.require(actor, Capability::VisitRead)?;
        let mut visits = fetch_all::<Visit>(self.store.as_ref(), filter).await?;
        visits.retain(|v| self.may_read(actor, Capability::VisitRead, v));
        visits.sort_by(|a, b| b.visit_datetime.cmp(&a.visit_datetime));
        Ok(visits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use models::{Department, PaymentMethod, PrescriptionItem, VisitType};
    use rust_decimal_macros::dec;
    use serde_json::json;

    struct Clinic {
        orchestrator: WorkflowOrchestrator,
        admin: Actor,
        registration: Actor,
        doctor: Actor,
        patient: Actor,
        lab: Actor,
        pharmacy: Actor,
        cashier: Actor,
        cbc: LabTest,
        paracetamol: Medicine,
    }

    async fn clinic() -> Clinic {
        let orchestrator = WorkflowOrchestrator::in_memory();
        let cbc = LabTest::new("CBC", "Complete blood count", dec!(100000));
        let paracetamol = Medicine::new("Paracetamol 500mg", dec!(1500));
        orchestrator.store().save(cbc.clone().into(), 0).await.unwrap();
        orchestrator.store().save(paracetamol.clone().into(), 0).await.unwrap();
        Clinic {
            orchestrator,
            admin: Actor::admin(Uuid::new_v4()),
            registration: Actor::staff(Uuid::new_v4(), Department::Registration),
            doctor: Actor::doctor(Uuid::new_v4()),
            patient: Actor::patient(Uuid::new_v4()),
            lab: Actor::staff(Uuid::new_v4(), Department::Laboratory),
            pharmacy: Actor::staff(Uuid::new_v4(), Department::Pharmacy),
            cashier: Actor::staff(Uuid::new_v4(), Department::Cashier),
            cbc,
            paracetamol,
        }
    }

    impl Clinic {
        async fn register(&self) -> Uuid {
            let delta = self
                .orchestrator
                .perform(
                    &self.registration,
                    Action::VisitRegister,
                    json!({
                        "patient_id": self.patient.id(),
                        "doctor_id": self.doctor.id(),
                        "clinic_id": Uuid::new_v4(),
                        "visit_datetime": Utc::now() + Duration::hours(1),
                        "chief_complaint": "fever",
                    }),
                )
                .await
                .unwrap();
            delta.visit_id
        }

        async fn visit(&self, id: Uuid) -> Visit {
            fetch::<Visit>(self.orchestrator.store().as_ref(), id).await.unwrap()
        }

        async fn examining(&self) -> Uuid {
            let id = self.register().await;
            self.orchestrator
                .perform(&self.doctor, Action::VisitStartExam, json!({ "visit_id": id, "expected_version": 1 }))
                .await
                .unwrap();
            id
        }
    }

    #[tokio::test]
    async fn register_records_the_registering_staff() {
        let clinic = clinic().await;
        let id = clinic.register().await;
        let visit = clinic.visit(id).await;
        assert_eq!(visit.status, VisitStatus::Registered);
        assert_eq!(visit.version, 1);
        assert_eq!(visit.registration_staff_id, Some(clinic.registration.id()));
        assert_eq!(visit.visit_type, VisitType::General);
    }

    #[tokio::test]
    async fn denial_happens_before_payload_decoding() {
        let clinic = clinic().await;
        let err = clinic
            .orchestrator
            .perform(&clinic.patient, Action::LabOrderEnterResult, json!("garbage"))
            .await
            .unwrap_err();
        match err {
            DomainError::AuthorizationDenied { capability, fallback, .. } => {
                assert_eq!(capability, "laborder.enter_result");
                assert_eq!(fallback.as_str(), "/dashboard/patient");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_action_name_is_a_validation_error() {
        let clinic = clinic().await;
        let err = clinic
            .orchestrator
            .perform_named(&clinic.admin, "visit.teleport", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::UnknownAction(_))));
    }

    #[tokio::test]
    async fn other_doctors_visit_is_not_owned() {
        let clinic = clinic().await;
        let id = clinic.register().await;
        let stranger = Actor::doctor(Uuid::new_v4());
        let err = clinic
            .orchestrator
            .perform(&stranger, Action::VisitStartExam, json!({ "visit_id": id, "expected_version": 1 }))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AuthorizationDenied { reason: security::DenialReason::NotOwner, .. }));
        assert_eq!(clinic.visit(id).await.status, VisitStatus::Registered);
    }

    #[tokio::test]
    async fn repeated_start_exam_writes_nothing() {
        let clinic = clinic().await;
        let id = clinic.examining().await;
        let delta = clinic
            .orchestrator
            .perform(&clinic.doctor, Action::VisitStartExam, json!({ "visit_id": id, "expected_version": 2 }))
            .await
            .unwrap();
        assert!(delta.is_noop());
        let retry = clinic
            .orchestrator
            .perform(&clinic.doctor, Action::VisitStartExam, json!({ "visit_id": id, "expected_version": 1 }))
            .await
            .unwrap();
        assert!(retry.is_noop());
        assert_eq!(clinic.visit(id).await.version, 2);
    }

    #[tokio::test]
    async fn medical_record_charges_consultation_and_requires_version_on_update() {
        let clinic = clinic().await;
        let id = clinic.examining().await;
        let fields = json!({ "visit_id": id, "diagnosis": "influenza" });
        let delta = clinic.orchestrator.perform(&clinic.doctor, Action::MedicalRecordUpsert, fields.clone()).await.unwrap();
        let invoice = delta.invoice.expect("consultation creates the invoice");
        assert_eq!(invoice.total_amount, dec!(50000));
        assert_eq!(invoice.invoice_id, id);

        let err = clinic.orchestrator.perform(&clinic.doctor, Action::MedicalRecordUpsert, fields).await.unwrap_err();
        assert!(err.is_conflict());

        let delta = clinic
            .orchestrator
            .perform(
                &clinic.doctor,
                Action::MedicalRecordUpsert,
                json!({ "visit_id": id, "expected_version": 1, "treatment_plan": "rest" }),
            )
            .await
            .unwrap();
        assert_eq!(delta.target_version(), Some(2));
        assert!(delta.invoice.is_none());

        let record = fetch::<MedicalRecord>(clinic.orchestrator.store().as_ref(), id).await.unwrap();
        assert_eq!(record.diagnosis.as_deref(), Some("influenza"));
        assert_eq!(record.treatment_plan.as_deref(), Some("rest"));
    }

    #[tokio::test]
    async fn medical_record_requires_examining_visit() {
        let clinic = clinic().await;
        let id = clinic.register().await;
        let err = clinic
            .orchestrator
            .perform(&clinic.doctor, Action::MedicalRecordUpsert, json!({ "visit_id": id, "diagnosis": "x" }))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::VisitNotActive { current: VisitStatus::Registered, .. }));
    }

    #[tokio::test]
    async fn lab_flow_bills_the_test_price() {
        let clinic = clinic().await;
        let id = clinic.examining().await;
        let created = clinic
            .orchestrator
            .perform(&clinic.doctor, Action::LabOrderCreate, json!({ "visit_id": id, "lab_test_id": clinic.cbc.id }))
            .await
            .unwrap();
        let order_id = created.target.id;

        clinic
            .orchestrator
            .perform(&clinic.lab, Action::LabOrderStart, json!({ "lab_order_id": order_id, "expected_version": 1 }))
            .await
            .unwrap();
        let done = clinic
            .orchestrator
            .perform(
                &clinic.lab,
                Action::LabOrderEnterResult,
                json!({ "lab_order_id": order_id, "expected_version": 2, "value": "13.5", "unit": "g/dL" }),
            )
            .await
            .unwrap();

        assert_eq!(done.change(&done.target).and_then(|c| c.status.as_deref()), Some("completed"));
        assert_eq!(done.invoice.map(|i| i.total_amount), Some(dec!(100000)));
        let order = fetch::<LabOrder>(clinic.orchestrator.store().as_ref(), order_id).await.unwrap();
        assert_eq!(order.result.map(|r| r.value), Some("13.5".to_string()));
    }

    #[tokio::test]
    async fn unknown_lab_test_is_rejected() {
        let clinic = clinic().await;
        let id = clinic.examining().await;
        let err = clinic
            .orchestrator
            .perform(&clinic.doctor, Action::LabOrderCreate, json!({ "visit_id": id, "lab_test_id": Uuid::new_v4() }))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::UnknownCatalogItem { .. })));
    }

    #[tokio::test]
    async fn stale_visit_version_blocks_child_mutation() {
        let clinic = clinic().await;
        let id = clinic.examining().await;
        let err = clinic
            .orchestrator
            .perform(
                &clinic.doctor,
                Action::LabOrderCreate,
                json!({ "visit_id": id, "lab_test_id": clinic.cbc.id, "expected_visit_version": 1 }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ConcurrentModification { entity: EntityType::Visit, expected: 1, actual: 2, .. }));
    }

    #[tokio::test]
    async fn prescription_dispense_bills_items_and_second_prescription_is_rejected() {
        let clinic = clinic().await;
        let id = clinic.examining().await;
        let items = vec![PrescriptionItem {
            medicine_id: clinic.paracetamol.id,
            quantity: 10,
            dosage: "500mg".into(),
            frequency: "3x daily".into(),
            duration: "5 days".into(),
            instructions: None,
        }];
        let command = Command::CreatePrescription(CreatePrescription {
            visit_id: id,
            items: items.clone(),
            notes: None,
            expected_visit_version: Some(2),
        });
        let created = clinic.orchestrator.execute(&clinic.doctor, command.clone()).await.unwrap();
        let err = clinic.orchestrator.execute(&clinic.doctor, command).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(ValidationError::DuplicatePrescription(_))));

        let prescription_id = created.target.id;
        for (action, version) in [(Action::PrescriptionStart, 1), (Action::PrescriptionComplete, 2)] {
            clinic
                .orchestrator
                .perform(&clinic.pharmacy, action, json!({ "prescription_id": prescription_id, "expected_version": version }))
                .await
                .unwrap();
        }
        let invoice = fetch::<Invoice>(clinic.orchestrator.store().as_ref(), id).await.unwrap();
        assert_eq!(invoice.total_amount, dec!(15000));
        assert_eq!(invoice.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn cancel_cascades_to_open_children_and_unpaid_invoice() {
        let clinic = clinic().await;
        let id = clinic.examining().await;
        clinic
            .orchestrator
            .perform(&clinic.doctor, Action::MedicalRecordUpsert, json!({ "visit_id": id, "diagnosis": "x" }))
            .await
            .unwrap();
        let order = clinic
            .orchestrator
            .perform(&clinic.doctor, Action::LabOrderCreate, json!({ "visit_id": id, "lab_test_id": clinic.cbc.id }))
            .await
            .unwrap();

        let delta = clinic
            .orchestrator
            .perform(&clinic.admin, Action::VisitCancel, json!({ "visit_id": id, "expected_version": 2 }))
            .await
            .unwrap();

        assert_eq!(delta.change(&order.target).and_then(|c| c.status.as_deref()), Some("cancelled"));
        assert_eq!(delta.invoice.map(|i| i.payment_status), Some(PaymentStatus::Canceled));
        assert_eq!(clinic.visit(id).await.status, VisitStatus::Canceled);
    }

    #[tokio::test]
    async fn paid_invoice_survives_visit_cancel() {
        let clinic = clinic().await;
        let id = clinic.examining().await;
        clinic
            .orchestrator
            .perform(&clinic.doctor, Action::MedicalRecordUpsert, json!({ "visit_id": id, "diagnosis": "x" }))
            .await
            .unwrap();
        clinic
            .orchestrator
            .execute(
                &clinic.cashier,
                Command::RecordPayment(RecordPayment {
                    invoice_id: id,
                    expected_version: 1,
                    amount: dec!(20000),
                    method: PaymentMethod::Cash,
                }),
            )
            .await
            .unwrap();

        let delta = clinic
            .orchestrator
            .perform(&clinic.registration, Action::VisitCancel, json!({ "visit_id": id, "expected_version": 2 }))
            .await
            .unwrap();
        assert!(delta.invoice.is_none());
        let invoice = fetch::<Invoice>(clinic.orchestrator.store().as_ref(), id).await.unwrap();
        assert_eq!(invoice.payment_status, PaymentStatus::Partial);
    }

    #[tokio::test]
    async fn overview_hides_sections_without_read_capability() {
        let clinic = clinic().await;
        let id = clinic.examining().await;
        clinic
            .orchestrator
            .perform(&clinic.doctor, Action::MedicalRecordUpsert, json!({ "visit_id": id, "diagnosis": "x" }))
            .await
            .unwrap();

        let cashier_view = clinic.orchestrator.visit_overview(&clinic.cashier, id).await.unwrap();
        assert!(cashier_view.medical_record.is_none());
        assert!(cashier_view.invoice.is_some());

        let patient_view = clinic.orchestrator.visit_overview(&clinic.patient, id).await.unwrap();
        assert!(patient_view.medical_record.is_some());
        assert!(clinic.orchestrator.available_actions(&clinic.patient, &patient_view).is_empty());

        let other_patient = Actor::patient(Uuid::new_v4());
        assert!(clinic.orchestrator.visit_overview(&other_patient, id).await.is_err());
    }

    #[tokio::test]
    async fn list_visits_only_returns_owned_visits() {
        let clinic = clinic().await;
        clinic.register().await;
        clinic.register().await;

        let mine = clinic.orchestrator.list_visits(&clinic.doctor, &ListFilter::default()).await.unwrap();
        assert_eq!(mine.len(), 2);
        let stranger = Actor::doctor(Uuid::new_v4());
        assert!(clinic.orchestrator.list_visits(&stranger, &ListFilter::default()).await.unwrap().is_empty());
    }

    #[test]
    fn tokens_round_trip_through_the_configured_secret() {
        let orchestrator = WorkflowOrchestrator::in_memory();
        let actor = Actor::staff(Uuid::new_v4(), Department::Cashier);
        let token = orchestrator.issue_token(&actor).unwrap();
        assert_eq!(orchestrator.authenticate(&token).unwrap(), actor);
    }
}
