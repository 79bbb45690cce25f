//! Member discovery for host objects exposed to script.
//!
//! Script sees a host object through the properties and methods its type
//! registers in [`HostType::describe`]. Descriptions are built once per type
//! per bridge and cached in a [`TypeCache`].
//!
//! ```ignore
//! struct Counter { hits: i32 }
//!
//! impl HostType for Counter {
//!     fn describe(t: &mut TypeBuilder<Self>) {
//!         t.property("hits", |this| this.hits)
//!          .method("add", &[Param::Int], |this, args| {
//!              this.hits += args.int(0)?;
//!              Ok(this.hits.into())
//!          });
//!     }
//! }
//! ```

use std::any::{self, Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::HostError;
use crate::proxy::ForeignObject;
use crate::value::HostValue;

/// A Rust type whose members script may read, write and call.
pub trait HostType: Any {
    fn describe(builder: &mut TypeBuilder<Self>)
    where
        Self: Sized;

    /// Runs when script releases the last pinned reference to this object
    /// and nothing else on the host still holds it.
    fn dispose(&mut self) {}
}

// ============================================================================
// Type descriptions
// ============================================================================

type Getter = Box<dyn Fn(&dyn Any) -> Result<HostValue, HostError>>;
type Setter = Box<dyn Fn(&mut dyn Any, &HostValue) -> Result<(), HostError>>;
type Method = Box<dyn Fn(&mut dyn Any, Args<'_>) -> Result<HostValue, HostError>>;

#[derive(Default)]
pub(crate) struct Property {
    get: Option<Getter>,
    set: Option<Setter>,
}

impl Property {
    pub(crate) fn getter(&self) -> Option<&Getter> {
        self.get.as_ref()
    }

    pub(crate) fn setter(&self) -> Option<&Setter> {
        self.set.as_ref()
    }
}

pub(crate) struct Overload {
    params: Vec<Param>,
    call: Method,
}

impl Overload {
    pub(crate) fn call(&self, this: &mut dyn Any, args: &[HostValue]) -> Result<HostValue, HostError> {
        (self.call)(this, Args::new(args))
    }

    /// `None` when the arguments cannot bind to this overload.
    fn score(&self, args: &[HostValue]) -> Option<u32> {
        if self.params.len() != args.len() {
            return None;
        }
        self.params
            .iter()
            .zip(args)
            .try_fold(0, |total, (param, arg)| param.score(arg).map(|score| total + score))
    }
}

/// Everything script can reach on one host type.
pub(crate) struct TypeInfo {
    name: &'static str,
    properties: HashMap<String, Property>,
    methods: HashMap<String, Vec<Overload>>,
}

impl TypeInfo {
    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub(crate) fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Picks the overload whose parameters fit `args` best. Ties go to the
    /// overload registered first.
    pub(crate) fn resolve(&self, name: &str, args: &[HostValue]) -> Result<&Overload, HostError> {
        let overloads = self.methods.get(name).ok_or_else(|| HostError::MissingMember {
            type_name: self.name,
            name: name.to_owned(),
        })?;

        let mut best: Option<(u32, &Overload)> = None;
        for overload in overloads {
            let Some(score) = overload.score(args) else {
                continue;
            };
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, overload));
            }
        }

        best.map(|(_, overload)| overload).ok_or_else(|| HostError::NoMatchingOverload {
            type_name: self.name,
            name: name.to_owned(),
            arity: args.len(),
        })
    }
}

/// Collects the members of `T` during [`HostType::describe`].
pub struct TypeBuilder<T> {
    info: TypeInfo,
    _marker: PhantomData<fn(&mut T)>,
}

impl<T: HostType> TypeBuilder<T> {
    fn new() -> Self {
        Self {
            info: TypeInfo {
                name: short_type_name::<T>(),
                properties: HashMap::new(),
                methods: HashMap::new(),
            },
            _marker: PhantomData,
        }
    }

    /// Overrides the name used in error messages.
    pub fn name(&mut self, name: &'static str) -> &mut Self {
        self.info.name = name;
        self
    }

    /// Read-only property.
    pub fn property<V, G>(&mut self, name: &str, get: G) -> &mut Self
    where
        V: Into<HostValue>,
        G: Fn(&T) -> V + 'static,
    {
        self.try_property(name, move |this| Ok(get(this).into()))
    }

    /// Read-only property whose getter can fail.
    pub fn try_property<G>(&mut self, name: &str, get: G) -> &mut Self
    where
        G: Fn(&T) -> Result<HostValue, HostError> + 'static,
    {
        let getter: Getter = Box::new(move |this: &dyn Any| get(receiver::<T>(this)?));
        self.info.properties.entry(name.to_owned()).or_default().get = Some(getter);
        self
    }

    /// Adds a setter to `name`. Without a getter the property is write-only.
    pub fn setter<S>(&mut self, name: &str, set: S) -> &mut Self
    where
        S: Fn(&mut T, &HostValue) -> Result<(), HostError> + 'static,
    {
        let setter: Setter = Box::new(move |this: &mut dyn Any, value: &HostValue| set(receiver_mut::<T>(this)?, value));
        self.info.properties.entry(name.to_owned()).or_default().set = Some(setter);
        self
    }

    pub fn property_mut<V, G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        V: Into<HostValue>,
        G: Fn(&T) -> V + 'static,
        S: Fn(&mut T, &HostValue) -> Result<(), HostError> + 'static,
    {
        self.property(name, get).setter(name, set)
    }

    /// Registers one overload of `name`. Call again with different
    /// parameters to add more.
    pub fn method<M>(&mut self, name: &str, params: &[Param], body: M) -> &mut Self
    where
        M: Fn(&mut T, Args<'_>) -> Result<HostValue, HostError> + 'static,
    {
        let call: Method = Box::new(move |this: &mut dyn Any, args: Args<'_>| body(receiver_mut::<T>(this)?, args));
        self.info.methods.entry(name.to_owned()).or_default().push(Overload {
            params: params.to_vec(),
            call,
        });
        self
    }
}

fn describe_type<T: HostType>() -> TypeInfo {
    let mut builder = TypeBuilder::<T>::new();
    T::describe(&mut builder);
    builder.info
}

fn dispose_type<T: HostType>(value: &mut dyn Any) {
    if let Some(value) = value.downcast_mut::<T>() {
        value.dispose();
    }
}

fn short_type_name<T>() -> &'static str {
    let full = any::type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

fn receiver<T: Any>(this: &dyn Any) -> Result<&T, HostError> {
    this.downcast_ref::<T>()
        .ok_or_else(|| HostError::thrown(format!("receiver is not a {}", short_type_name::<T>())))
}

fn receiver_mut<T: Any>(this: &mut dyn Any) -> Result<&mut T, HostError> {
    this.downcast_mut::<T>()
        .ok_or_else(|| HostError::thrown(format!("receiver is not a {}", short_type_name::<T>())))
}

/// Per-bridge cache of type descriptions.
#[derive(Default)]
pub(crate) struct TypeCache {
    types: HashMap<TypeId, Rc<TypeInfo>>,
}

impl TypeCache {
    pub(crate) fn resolve(&mut self, object: &HostObject) -> Rc<TypeInfo> {
        let meta = object.cell.meta;
        Rc::clone(self.types.entry(meta.id).or_insert_with(|| Rc::new((meta.describe)())))
    }

    pub(crate) fn len(&self) -> usize {
        self.types.len()
    }

    pub(crate) fn clear(&mut self) {
        self.types.clear();
    }
}

// ============================================================================
// Parameters and arguments
// ============================================================================

/// Parameter kinds used for overload resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Any,
    Bool,
    Int,
    Number,
    String,
    Date,
    Array,
    Object,
    Foreign,
}

impl Param {
    pub fn name(self) -> &'static str {
        match self {
            Param::Any => "value",
            Param::Bool => "bool",
            Param::Int => "int",
            Param::Number => "number",
            Param::String => "string",
            Param::Date => "date",
            Param::Array => "array",
            Param::Object => "host object",
            Param::Foreign => "foreign object",
        }
    }

    /// Exact matches beat conversions, which beat `Any`.
    fn score(self, arg: &HostValue) -> Option<u32> {
        match (self, arg) {
            (Param::Any, _) => Some(1),
            (Param::Bool, HostValue::Bool(_))
            | (Param::Int, HostValue::Int(_))
            | (Param::Number, HostValue::Number(_))
            | (Param::String, HostValue::String(_))
            | (Param::Date, HostValue::Date(_))
            | (Param::Array, HostValue::Array(_))
            | (Param::Object, HostValue::Object(_))
            | (Param::Foreign, HostValue::Foreign(_)) => Some(3),
            (Param::Number, HostValue::Int(_)) => Some(2),
            (Param::Int, HostValue::Number(_)) => arg.as_i32().map(|_| 2),
            _ => None,
        }
    }
}

/// Arguments passed to a host method.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    values: &'a [HostValue],
}

impl<'a> Args<'a> {
    pub(crate) fn new(values: &'a [HostValue]) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &'a [HostValue] {
        self.values
    }

    pub fn value(&self, position: usize) -> Result<&'a HostValue, HostError> {
        self.values.get(position).ok_or(HostError::ArgumentType {
            position,
            expected: "value",
            found: "nothing",
        })
    }

    pub fn bool(&self, position: usize) -> Result<bool, HostError> {
        self.read(position, Param::Bool, HostValue::as_bool)
    }

    pub fn int(&self, position: usize) -> Result<i32, HostError> {
        self.read(position, Param::Int, HostValue::as_i32)
    }

    pub fn number(&self, position: usize) -> Result<f64, HostError> {
        self.read(position, Param::Number, HostValue::as_f64)
    }

    pub fn string(&self, position: usize) -> Result<&'a str, HostError> {
        self.read(position, Param::String, HostValue::as_str)
    }

    pub fn date(&self, position: usize) -> Result<DateTime<Utc>, HostError> {
        self.read(position, Param::Date, HostValue::as_date)
    }

    pub fn array(&self, position: usize) -> Result<&'a [HostValue], HostError> {
        self.read(position, Param::Array, HostValue::as_array)
    }

    pub fn object(&self, position: usize) -> Result<&'a HostObject, HostError> {
        self.read(position, Param::Object, HostValue::as_object)
    }

    pub fn foreign(&self, position: usize) -> Result<&'a ForeignObject, HostError> {
        self.read(position, Param::Foreign, HostValue::as_foreign)
    }

    fn read<R>(&self, position: usize, param: Param, get: impl FnOnce(&'a HostValue) -> Option<R>) -> Result<R, HostError> {
        let value = self.value(position)?;
        get(value).ok_or(HostError::ArgumentType {
            position,
            expected: param.name(),
            found: value.kind(),
        })
    }
}

// ============================================================================
// Host objects
// ============================================================================

#[derive(Clone, Copy)]
struct TypeMeta {
    id: TypeId,
    name: &'static str,
    describe: fn() -> TypeInfo,
    dispose: fn(&mut dyn Any),
}

struct HostCell<T: ?Sized> {
    meta: TypeMeta,
    value: RefCell<T>,
}

/// Shared handle to a host object. Clones refer to the same object.
#[derive(Clone)]
pub struct HostObject {
    cell: Rc<HostCell<dyn Any>>,
}

impl HostObject {
    pub fn new<T: HostType>(value: T) -> Self {
        let meta = TypeMeta {
            id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
            describe: describe_type::<T>,
            dispose: dispose_type::<T>,
        };
        let cell: Rc<HostCell<dyn Any>> = Rc::new(HostCell {
            meta,
            value: RefCell::new(value),
        });
        Self { cell }
    }

    /// Rust type name, without its module path.
    pub fn type_name(&self) -> &'static str {
        self.cell.meta.name
    }

    pub fn is<T: HostType>(&self) -> bool {
        self.cell.meta.id == TypeId::of::<T>()
    }

    /// `None` when the object is not a `T` or is mutably borrowed.
    pub fn borrow<T: HostType>(&self) -> Option<Ref<'_, T>> {
        let value = self.cell.value.try_borrow().ok()?;
        Ref::filter_map(value, |value| value.downcast_ref::<T>()).ok()
    }

    pub fn borrow_mut<T: HostType>(&self) -> Option<RefMut<'_, T>> {
        let value = self.cell.value.try_borrow_mut().ok()?;
        RefMut::filter_map(value, |value| value.downcast_mut::<T>()).ok()
    }

    pub fn same(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    /// Runs host code against a shared borrow, turning panics and
    /// conflicting borrows into errors.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&dyn Any) -> Result<R, HostError>) -> Result<R, HostError> {
        let value = self.cell.value.try_borrow().map_err(|_| HostError::Reentrant {
            type_name: self.type_name(),
        })?;
        guard_panics(|| f(&*value))
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut dyn Any) -> Result<R, HostError>) -> Result<R, HostError> {
        let mut value = self.cell.value.try_borrow_mut().map_err(|_| HostError::Reentrant {
            type_name: self.type_name(),
        })?;
        guard_panics(|| f(&mut *value))
    }

    /// Disposes the object if `self` is its only remaining reference.
    pub(crate) fn dispose_if_unshared(self) {
        if Rc::strong_count(&self.cell) != 1 {
            return;
        }
        let dispose = self.cell.meta.dispose;
        let outcome = self.write(|value| {
            dispose(value);
            Ok(())
        });
        if let Err(err) = outcome {
            warn!(type_name = self.type_name(), %err, "host object dispose failed");
        }
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({})", self.type_name())
    }
}

fn guard_panics<R>(f: impl FnOnce() -> Result<R, HostError>) -> Result<R, HostError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| (*text).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        Err(HostError::Panicked(message))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Probe {
        n: i32,
        disposed: Rc<Cell<u32>>,
    }

    impl HostType for Probe {
        fn describe(t: &mut TypeBuilder<Self>) {
            t.property_mut("n", |this| this.n, |this, value| {
                this.n = value.to_i32()?;
                Ok(())
            })
            .try_property("broken", |_| Err(HostError::thrown("broken getter")))
            .setter("sink", |_, _| Ok(()))
            .method("pick", &[Param::Int], |_, _| Ok("int".into()))
            .method("pick", &[Param::Number], |_, _| Ok("number".into()))
            .method("pick", &[Param::String], |_, _| Ok("string".into()))
            .method("pick", &[Param::Any], |_, _| Ok("any".into()))
            .method("add", &[Param::Int, Param::Int], |this, args| {
                this.n = args.int(0)? + args.int(1)?;
                Ok(this.n.into())
            })
            .method("boom", &[], |_, _| panic!("kaboom"));
        }

        fn dispose(&mut self) {
            self.disposed.set(self.disposed.get() + 1);
        }
    }

    fn probe() -> (HostObject, Rc<Cell<u32>>) {
        let disposed = Rc::new(Cell::new(0));
        let object = HostObject::new(Probe {
            n: 42,
            disposed: Rc::clone(&disposed),
        });
        (object, disposed)
    }

    fn call(object: &HostObject, info: &TypeInfo, name: &str, args: &[HostValue]) -> Result<HostValue, HostError> {
        let overload = info.resolve(name, args)?;
        object.write(|this| overload.call(this, args))
    }

    #[test]
    fn descriptions_are_cached_per_type() {
        let (a, _) = probe();
        let (b, _) = probe();
        let mut cache = TypeCache::default();
        let first = cache.resolve(&a);
        assert!(Rc::ptr_eq(&first, &cache.resolve(&b)));
        assert_eq!(cache.len(), 1);
        assert_eq!(first.name(), "Probe");
    }

    #[test]
    fn properties_read_and_write() {
        let (object, _) = probe();
        let info = describe_type::<Probe>();

        let get = info.property("n").and_then(Property::getter).unwrap();
        assert_eq!(object.read(|this| get(this)), Ok(HostValue::Int(42)));

        let set = info.property("n").and_then(Property::setter).unwrap();
        object.write(|this| set(this, &HostValue::Int(7))).unwrap();
        assert_eq!(object.borrow::<Probe>().map(|p| p.n), Some(7));

        assert!(matches!(
            object.write(|this| set(this, &HostValue::from("x"))),
            Err(HostError::ArgumentType { expected: "int", .. })
        ));

        assert!(info.property("sink").and_then(Property::getter).is_none());
        assert!(info.property("n").is_some() && !info.has_method("n"));
    }

    #[test]
    fn getter_errors_surface_unwrapped() {
        let (object, _) = probe();
        let info = describe_type::<Probe>();
        let get = info.property("broken").and_then(Property::getter).unwrap();
        assert_eq!(object.read(|this| get(this)), Err(HostError::thrown("broken getter")));
    }

    #[test]
    fn overloads_prefer_exact_matches() {
        let (object, _) = probe();
        let info = describe_type::<Probe>();

        assert_eq!(call(&object, &info, "pick", &[HostValue::Int(1)]), Ok("int".into()));
        assert_eq!(call(&object, &info, "pick", &[HostValue::Number(1.5)]), Ok("number".into()));
        assert_eq!(call(&object, &info, "pick", &["s".into()]), Ok("string".into()));
        assert_eq!(call(&object, &info, "pick", &[HostValue::Bool(true)]), Ok("any".into()));

        // Integral doubles still bind to int parameters.
        assert_eq!(
            call(&object, &info, "add", &[HostValue::Number(29.0), HostValue::Int(13)]),
            Ok(HostValue::Int(42))
        );
    }

    #[test]
    fn unmatched_calls_are_reported() {
        let info = describe_type::<Probe>();
        assert!(matches!(
            info.resolve("add", &[HostValue::Int(1)]),
            Err(HostError::NoMatchingOverload { arity: 1, .. })
        ));
        assert!(matches!(info.resolve("nope", &[]), Err(HostError::MissingMember { .. })));
    }

    #[test]
    fn panics_become_errors() {
        let (object, _) = probe();
        let info = describe_type::<Probe>();
        assert_eq!(call(&object, &info, "boom", &[]), Err(HostError::Panicked("kaboom".into())));
        // The borrow was released during unwinding.
        assert!(object.borrow_mut::<Probe>().is_some());
    }

    #[test]
    fn nested_access_is_reentrancy_error() {
        let (object, _) = probe();
        let outer = object.borrow_mut::<Probe>();
        assert!(outer.is_some());
        assert_eq!(object.read(|_| Ok(())), Err(HostError::Reentrant { type_name: "Probe" }));
    }

    #[test]
    fn dispose_waits_for_the_last_reference() {
        let (object, disposed) = probe();
        let held = object.clone();
        object.dispose_if_unshared();
        assert_eq!(disposed.get(), 0);
        held.dispose_if_unshared();
        assert_eq!(disposed.get(), 1);
    }

    #[test]
    fn args_report_position_and_kind() {
        let values = [HostValue::Int(1), HostValue::from("two")];
        let args = Args::new(&values);
        assert_eq!(args.int(0), Ok(1));
        assert_eq!(args.string(1), Ok("two"));
        assert_eq!(
            args.int(1),
            Err(HostError::ArgumentType { position: 1, expected: "int", found: "string" })
        );
        assert!(matches!(args.value(5), Err(HostError::ArgumentType { position: 5, .. })));
    }
}
