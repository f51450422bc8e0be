//! The twin document.
//!
//! [`TwinDocument`] owns the desired and reported stores, the optional tag
//! store, the device record, and the change callbacks. Callers either hand
//! it typed trees (the programmatic API, validated with [`Limits::API`]) or
//! raw JSON bodies returned by the service (validated with
//! [`Limits::DOCUMENT`]).
//!
//! # Document shapes
//!
//! [`TwinDocument::ingest`] accepts both bodies the service returns without
//! being told which one it has:
//!
//! ```text
//! full twin:        {"deviceId": .., "tags": {..}, "properties": {"desired": {..}, "reported": {..}}}
//! properties only:  {"desired": {..}, "reported": {..}}
//! ```
//!
//! Top-level keys are walked in document order. `properties` or `tags` mark
//! the body as a full twin. A `desired`/`reported` key seen before either of
//! them marks it as properties-only, and one seen after them is ambiguous and
//! rejects the whole body. A properties-only body, like a `properties`
//! section, may hold nothing but `desired` and `reported`.
//!
//! Depth in an ingested body is counted from the body's root, wrappers
//! included. Every operation validates and plans completely before touching
//! any state, so an error leaves the document unchanged.

use serde::Deserialize;
use serde_json::{Map, Value};
use twin_types::{
    json_type_name, ConnectionState, DeviceStatus, PropertyTree, TwinError, TwinValue,
};

use crate::clock::{system_clock, Clock};
use crate::manager::{DeviceManager, DeviceRecord, DeviceUpdate};
use crate::notifier::{Bag, ChangeHandler, ChangeNotifier};
use crate::store::{PropertyStore, VERSION_KEY};
use crate::validator::{validate, Limits};

const TAGS: &str = "tags";
const PROPERTIES: &str = "properties";
const DESIRED: &str = "desired";
const REPORTED: &str = "reported";

/// Optional document features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TwinOptions {
    /// Create the tag store.
    pub tags_enabled: bool,
    /// Record per-leaf timestamps in the desired and reported stores.
    pub metadata_enabled: bool,
}

/// A device twin: desired/reported properties, optional tags, identity.
#[derive(Debug)]
pub struct TwinDocument {
    manager: DeviceManager,
    desired: PropertyStore,
    reported: PropertyStore,
    tags: Option<PropertyStore>,
    notifier: ChangeNotifier,
    clock: Clock,
}

/// One property bag extracted from an ingested body.
#[derive(Debug)]
struct BagUpdate {
    tree: PropertyTree,
    version: Option<i64>,
}

/// What an ingested body asks for, decided before anything is applied.
#[derive(Debug, Default)]
struct IngestPlan {
    desired: Option<BagUpdate>,
    reported: Option<BagUpdate>,
    tags: Option<PropertyTree>,
}

/// Diffs produced by applying a plan.
#[derive(Debug, Default)]
struct Applied {
    desired: Option<PropertyTree>,
    reported: Option<PropertyTree>,
    tags: Option<PropertyTree>,
}

impl TwinDocument {
    /// Create an empty document: empty desired and reported bags, no tags.
    pub fn new() -> Self {
        Self {
            manager: DeviceManager::new(),
            desired: PropertyStore::new(),
            reported: PropertyStore::new(),
            tags: None,
            notifier: ChangeNotifier::new(),
            clock: system_clock,
        }
    }

    /// Create a document with the given features switched on.
    pub fn with_options(options: TwinOptions) -> Self {
        let mut doc = Self::new();
        if options.tags_enabled {
            doc.enable_tags();
        }
        if options.metadata_enabled {
            doc.enable_metadata();
        }
        doc
    }

    /// Use `clock` for status and metadata timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self.desired.set_clock(clock);
        self.reported.set_clock(clock);
        if let Some(tags) = self.tags.as_mut() {
            tags.set_clock(clock);
        }
        self
    }

    /// Create the tag store. Has no effect if tags are already enabled.
    pub fn enable_tags(&mut self) {
        if self.tags.is_none() {
            self.tags = Some(PropertyStore::new().with_clock(self.clock));
        }
    }

    /// Whether the tag store exists.
    pub fn tags_enabled(&self) -> bool {
        self.tags.is_some()
    }

    /// Record per-leaf timestamps in the desired and reported stores.
    pub fn enable_metadata(&mut self) {
        self.desired.enable_metadata();
        self.reported.enable_metadata();
    }

    // --- callbacks -------------------------------------------------------

    /// Register (or with `None`, clear) the desired-changed callback.
    pub fn set_desired_callback(&mut self, handler: Option<ChangeHandler>) {
        self.notifier.slot_mut(Bag::Desired).replace(handler);
    }

    /// Register (or with `None`, clear) the reported-changed callback.
    pub fn set_reported_callback(&mut self, handler: Option<ChangeHandler>) {
        self.notifier.slot_mut(Bag::Reported).replace(handler);
    }

    /// Register (or with `None`, clear) the tags-changed callback.
    pub fn set_tags_callback(&mut self, handler: Option<ChangeHandler>) {
        self.notifier.slot_mut(Bag::Tags).replace(handler);
    }

    // --- programmatic updates -------------------------------------------

    /// Merge into the desired bag. Returns the diff as JSON, or `None` when
    /// nothing changed.
    ///
    /// # Errors
    ///
    /// Validation errors; the bag is untouched.
    pub fn update_desired(&mut self, update: &PropertyTree) -> Result<Option<String>, TwinError> {
        validate(update, Limits::API)?;
        Ok(self.desired.apply(update).map(|diff| diff.to_json_string()))
    }

    /// Merge into the reported bag. See [`TwinDocument::update_desired`].
    ///
    /// # Errors
    ///
    /// Validation errors; the bag is untouched.
    pub fn update_reported(&mut self, update: &PropertyTree) -> Result<Option<String>, TwinError> {
        validate(update, Limits::API)?;
        Ok(self.reported.apply(update).map(|diff| diff.to_json_string()))
    }

    /// Merge into tags. See [`TwinDocument::update_desired`].
    ///
    /// # Errors
    ///
    /// [`TwinError::FeatureNotEnabled`] without tags, or validation errors.
    pub fn update_tags(&mut self, update: &PropertyTree) -> Result<Option<String>, TwinError> {
        let tags = self.tags.as_mut().ok_or(TwinError::FeatureNotEnabled(TAGS))?;
        validate(update, Limits::API)?;
        Ok(tags.apply(update).map(|diff| diff.to_json_string()))
    }

    /// Merge into any combination of bags and build a patch body.
    ///
    /// All inputs are validated before any bag is touched. When something
    /// changed, returns the identity fields plus `tags` (if enabled) and
    /// `properties`, with `{}` standing in for bags that did not change.
    ///
    /// # Errors
    ///
    /// Validation errors, or [`TwinError::FeatureNotEnabled`] when tags are
    /// supplied but not enabled.
    pub fn update_twin(
        &mut self,
        desired: Option<&PropertyTree>,
        reported: Option<&PropertyTree>,
        tags: Option<&PropertyTree>,
    ) -> Result<Option<String>, TwinError> {
        for tree in [desired, reported, tags].into_iter().flatten() {
            validate(tree, Limits::API)?;
        }
        if tags.is_some() && self.tags.is_none() {
            return Err(TwinError::FeatureNotEnabled(TAGS));
        }

        let desired_diff = desired.and_then(|tree| self.desired.apply(tree));
        let reported_diff = reported.and_then(|tree| self.reported.apply(tree));
        let tags_diff = match (self.tags.as_mut(), tags) {
            (Some(store), Some(tree)) => store.apply(tree),
            _ => None,
        };

        if desired_diff.is_none() && reported_diff.is_none() && tags_diff.is_none() {
            return Ok(None);
        }

        let mut body = self.manager.encode();
        if self.tags.is_some() {
            body.insert(TAGS.to_string(), diff_or_empty(tags_diff));
        }
        let mut properties = Map::new();
        properties.insert(DESIRED.to_string(), diff_or_empty(desired_diff));
        properties.insert(REPORTED.to_string(), diff_or_empty(reported_diff));
        body.insert(PROPERTIES.to_string(), Value::Object(properties));

        Ok(Some(Value::Object(body).to_string()))
    }

    /// Replace the desired bag. `None` clears it. Returns the new content.
    ///
    /// # Errors
    ///
    /// Validation errors; the bag is untouched.
    pub fn reset_desired(&mut self, tree: Option<&PropertyTree>) -> Result<String, TwinError> {
        reset_store(&mut self.desired, tree)
    }

    /// Replace the reported bag. See [`TwinDocument::reset_desired`].
    ///
    /// # Errors
    ///
    /// Validation errors; the bag is untouched.
    pub fn reset_reported(&mut self, tree: Option<&PropertyTree>) -> Result<String, TwinError> {
        reset_store(&mut self.reported, tree)
    }

    /// Replace tags. See [`TwinDocument::reset_desired`].
    ///
    /// # Errors
    ///
    /// [`TwinError::FeatureNotEnabled`] without tags, or validation errors.
    pub fn reset_tags(&mut self, tree: Option<&PropertyTree>) -> Result<String, TwinError> {
        let tags = self.tags.as_mut().ok_or(TwinError::FeatureNotEnabled(TAGS))?;
        reset_store(tags, tree)
    }

    /// Update identity and status. Returns the full document as JSON when
    /// something changed, `None` otherwise.
    ///
    /// # Errors
    ///
    /// [`TwinError::MissingReasonOnStatusChange`]; nothing is modified.
    pub fn update_device_manager(
        &mut self,
        update: DeviceUpdate,
    ) -> Result<Option<String>, TwinError> {
        let changed = self.manager.update(update, (self.clock)())?;
        Ok(changed.then(|| self.to_json()))
    }

    // --- JSON ingestion -------------------------------------------------

    /// Ingest a twin body returned by the service.
    ///
    /// Empty text (or `null`) is a no-op. Callbacks fire once per bag whose
    /// diff is non-empty, after every change has been applied.
    ///
    /// # Errors
    ///
    /// [`TwinError::MalformedDocument`] for syntax errors, non-object
    /// sections, or an ambiguous shape; validation errors otherwise. The
    /// document is unchanged on error.
    pub fn ingest(&mut self, json: &str) -> Result<(), TwinError> {
        self.try_ingest(json).inspect_err(|err| {
            tracing::warn!(error = %err, "rejected twin document");
        })
    }

    fn try_ingest(&mut self, json: &str) -> Result<(), TwinError> {
        let Some(map) = parse_object(json)? else {
            return Ok(());
        };
        let order: Vec<String> = map.keys().cloned().collect();
        let doc = PropertyTree::from_json_map(map)?;
        validate(&doc, Limits::DOCUMENT)?;

        let record = DeviceRecord::decode(&doc)?;
        let plan = self.plan(&order, &doc)?;

        self.manager.absorb(record);
        let applied = self.apply_plan(plan);
        self.notify(&applied);
        Ok(())
    }

    /// Decide what `doc` asks for, walking top-level keys in `order`.
    fn plan(&self, order: &[String], doc: &PropertyTree) -> Result<IngestPlan, TwinError> {
        let mut plan = IngestPlan::default();
        let mut saw_wrapper = false;

        for key in order {
            match key.as_str() {
                PROPERTIES => {
                    if let Some(container) = section(doc, PROPERTIES)? {
                        split_properties(container, &mut plan)?;
                    }
                    saw_wrapper = true;
                }
                DESIRED | REPORTED if !saw_wrapper => {
                    tracing::debug!("properties-only twin body");
                    let mut shorthand = IngestPlan::default();
                    split_properties(doc, &mut shorthand)?;
                    return Ok(shorthand);
                }
                DESIRED | REPORTED => {
                    return Err(TwinError::MalformedDocument(format!(
                        "top-level {key:?} alongside a properties or tags section"
                    )));
                }
                TAGS => {
                    if self.tags.is_some() {
                        plan.tags = section(doc, TAGS)?.cloned();
                    }
                    saw_wrapper = true;
                }
                _ => {}
            }
        }

        if saw_wrapper {
            tracing::debug!("full twin body");
        }
        Ok(plan)
    }

    fn apply_plan(&mut self, plan: IngestPlan) -> Applied {
        let mut applied = Applied::default();
        if let Some(update) = plan.desired {
            applied.desired = apply_bag(&mut self.desired, update);
        }
        if let Some(update) = plan.reported {
            applied.reported = apply_bag(&mut self.reported, update);
        }
        if let (Some(tree), Some(store)) = (plan.tags, self.tags.as_mut()) {
            applied.tags = store.apply(&tree);
        }
        applied
    }

    fn notify(&mut self, applied: &Applied) {
        self.notifier.notify(Bag::Desired, applied.desired.as_ref());
        self.notifier.notify(Bag::Reported, applied.reported.as_ref());
        self.notifier.notify(Bag::Tags, applied.tags.as_ref());
    }

    /// Merge a bare desired bag body, firing the desired callback on change.
    ///
    /// # Errors
    ///
    /// As [`TwinDocument::ingest`].
    pub fn ingest_desired(&mut self, json: &str) -> Result<(), TwinError> {
        self.ingest_bag(Bag::Desired, json)
    }

    /// Merge a bare reported bag body, firing the reported callback on change.
    ///
    /// # Errors
    ///
    /// As [`TwinDocument::ingest`].
    pub fn ingest_reported(&mut self, json: &str) -> Result<(), TwinError> {
        self.ingest_bag(Bag::Reported, json)
    }

    /// Merge a bare tags body, firing the tags callback on change.
    ///
    /// # Errors
    ///
    /// [`TwinError::FeatureNotEnabled`] without tags, otherwise as
    /// [`TwinDocument::ingest`].
    pub fn ingest_tags(&mut self, json: &str) -> Result<(), TwinError> {
        self.ingest_bag(Bag::Tags, json)
    }

    fn ingest_bag(&mut self, bag: Bag, json: &str) -> Result<(), TwinError> {
        let Some(map) = parse_object(json)? else {
            return Ok(());
        };
        let tree = PropertyTree::from_json_map(map)?;
        validate(&tree, Limits::DOCUMENT)?;
        let update = split_bag(&tree)?;

        let store = match bag {
            Bag::Desired => &mut self.desired,
            Bag::Reported => &mut self.reported,
            Bag::Tags => self.tags.as_mut().ok_or(TwinError::FeatureNotEnabled(TAGS))?,
        };
        let diff = apply_bag(store, update);
        self.notifier.notify(bag, diff.as_ref());
        Ok(())
    }

    // --- encoding and accessors ----------------------------------------

    /// Encode the whole document.
    pub fn to_value(&self) -> Value {
        let mut body = self.manager.encode();
        if let Some(tags) = &self.tags {
            body.insert(TAGS.to_string(), tags.to_json_value());
        }
        let mut properties = Map::new();
        properties.insert(DESIRED.to_string(), self.desired.to_json_value());
        properties.insert(REPORTED.to_string(), self.reported.to_json_value());
        body.insert(PROPERTIES.to_string(), Value::Object(properties));
        Value::Object(body)
    }

    /// Encode the whole document as JSON text.
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    /// Desired properties.
    pub fn desired(&self) -> &PropertyTree {
        self.desired.tree()
    }

    /// Reported properties.
    pub fn reported(&self) -> &PropertyTree {
        self.reported.tree()
    }

    /// Desired bag store, for versions and metadata.
    pub fn desired_store(&self) -> &PropertyStore {
        &self.desired
    }

    /// Reported bag store, for versions and metadata.
    pub fn reported_store(&self) -> &PropertyStore {
        &self.reported
    }

    /// Service-assigned version of the desired bag.
    pub fn desired_version(&self) -> Option<i64> {
        self.desired.version()
    }

    /// Service-assigned version of the reported bag.
    pub fn reported_version(&self) -> Option<i64> {
        self.reported.version()
    }

    /// Tags.
    ///
    /// # Errors
    ///
    /// [`TwinError::FeatureNotEnabled`] without tags.
    pub fn tags(&self) -> Result<&PropertyTree, TwinError> {
        self.tags
            .as_ref()
            .map(PropertyStore::tree)
            .ok_or(TwinError::FeatureNotEnabled(TAGS))
    }

    /// The identity/status record.
    pub fn manager(&self) -> &DeviceManager {
        &self.manager
    }

    /// Device id.
    pub fn device_id(&self) -> Option<&str> {
        self.manager.device_id()
    }

    /// Generation id.
    pub fn generation_id(&self) -> Option<&str> {
        self.manager.generation_id()
    }

    /// Weak entity tag.
    pub fn etag(&self) -> Option<&str> {
        self.manager.etag()
    }

    /// Device status.
    pub fn status(&self) -> DeviceStatus {
        self.manager.status()
    }

    /// Reason for the current status.
    pub fn status_reason(&self) -> Option<&str> {
        self.manager.status_reason()
    }

    /// When the status last changed.
    pub fn status_updated_time(&self) -> Option<&str> {
        self.manager.status_updated_time()
    }

    /// Connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.manager.connection_state()
    }

    /// When the connection state last changed.
    pub fn connection_state_updated_time(&self) -> Option<&str> {
        self.manager.connection_state_updated_time()
    }

    /// Last device activity.
    pub fn last_activity_time(&self) -> Option<&str> {
        self.manager.last_activity_time()
    }
}

impl Default for TwinDocument {
    fn default() -> Self {
        Self::new()
    }
}

fn diff_or_empty(diff: Option<PropertyTree>) -> Value {
    diff.map_or_else(|| Value::Object(Map::new()), |diff| diff.to_json_value())
}

fn reset_store(
    store: &mut PropertyStore,
    tree: Option<&PropertyTree>,
) -> Result<String, TwinError> {
    match tree {
        Some(tree) => {
            validate(tree, Limits::API)?;
            Ok(store.reset(tree).to_json_string())
        }
        None => {
            store.clear();
            Ok(PropertyTree::new().to_json_string())
        }
    }
}

/// Parse `json` as an object. `Ok(None)` for empty text or `null`.
fn parse_object(json: &str) -> Result<Option<Map<String, Value>>, TwinError> {
    if json.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(json)? {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(TwinError::MalformedDocument(format!(
            "expected a JSON object, found {}",
            json_type_name(&other)
        ))),
    }
}

/// The tree under `key`; `None` when absent or null.
fn section<'a>(doc: &'a PropertyTree, key: &str) -> Result<Option<&'a PropertyTree>, TwinError> {
    match doc.get(key) {
        None | Some(TwinValue::Null) => Ok(None),
        Some(TwinValue::Tree(tree)) => Ok(Some(tree)),
        Some(other) => Err(TwinError::MalformedDocument(format!(
            "{key} must be an object, found {}",
            other.type_name()
        ))),
    }
}

/// Read `desired`/`reported` out of a properties container. Any other key
/// makes the container malformed.
fn split_properties(container: &PropertyTree, plan: &mut IngestPlan) -> Result<(), TwinError> {
    let stray = container
        .keys()
        .find(|k| k.as_str() != DESIRED && k.as_str() != REPORTED);
    if let Some(key) = stray {
        return Err(TwinError::MalformedDocument(format!(
            "unexpected key {key:?} beside desired and reported"
        )));
    }
    if let Some(tree) = section(container, DESIRED)? {
        plan.desired = Some(split_bag(tree)?);
    }
    if let Some(tree) = section(container, REPORTED)? {
        plan.reported = Some(split_bag(tree)?);
    }
    Ok(())
}

/// Separate a bag's reserved root keys from its properties.
///
/// `$version` becomes the bag version; every other root `$` key is
/// service-reflected and dropped.
fn split_bag(tree: &PropertyTree) -> Result<BagUpdate, TwinError> {
    let mut version = None;
    let mut properties = PropertyTree::new();

    for (key, value) in tree {
        if key == VERSION_KEY {
            version = match value {
                TwinValue::Null => None,
                other => Some(other.as_i64().ok_or_else(|| {
                    TwinError::MalformedDocument(format!(
                        "{VERSION_KEY} must be an integer, found {}",
                        other.type_name()
                    ))
                })?),
            };
        } else if !key.starts_with('$') {
            properties.insert(key.clone(), value.clone());
        }
    }

    Ok(BagUpdate {
        tree: properties,
        version,
    })
}

fn apply_bag(store: &mut PropertyStore, update: BagUpdate) -> Option<PropertyTree> {
    if let Some(version) = update.version {
        store.set_version(version);
    }
    store.apply(&update.tree)
}
