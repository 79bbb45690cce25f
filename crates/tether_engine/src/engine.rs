//! Native engine: one QuickJS runtime and context behind the wire protocol.

use crate::callbacks::HostCallbacks;
use crate::handles::HandleTable;
use crate::marshal;
use crate::prelude::{Hooks, Prelude};
use crate::{EngineError, EngineSettings};
use rquickjs::function::{Rest, This};
use rquickjs::{qjs, Array, Context, Ctx, Exception, Function, Object, Persistent, Runtime, Value};
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;
use std::rc::{Rc, Weak};
use tether_wire::{dispose, ForeignHandle, TaggedValue};
use tracing::{debug, trace};

/// State reachable from the native hook functions living inside QuickJS.
pub(crate) struct EngineShared {
    callbacks: Weak<dyn HostCallbacks>,
    settings: EngineSettings,
    prelude: RefCell<Option<Rc<Prelude>>>,
    handles: RefCell<HandleTable<Persistent<Object<'static>>>>,
    /// Context of the outermost call in progress, reused by nested calls.
    active: Cell<Option<NonNull<qjs::JSContext>>>,
}

impl EngineShared {
    fn new(callbacks: Weak<dyn HostCallbacks>, settings: EngineSettings) -> Self {
        Self {
            callbacks,
            settings,
            prelude: RefCell::new(None),
            handles: RefCell::new(HandleTable::new()),
            active: Cell::new(None),
        }
    }

    fn upgrade(ctx: &Ctx<'_>, shared: &Weak<EngineShared>) -> rquickjs::Result<Rc<EngineShared>> {
        shared
            .upgrade()
            .ok_or_else(|| Exception::throw_internal(ctx, "script engine has been destroyed"))
    }

    pub(crate) fn callbacks(&self) -> Weak<dyn HostCallbacks> {
        self.callbacks.clone()
    }

    pub(crate) fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn host(&self, ctx: &Ctx<'_>) -> rquickjs::Result<Rc<dyn HostCallbacks>> {
        self.callbacks
            .upgrade()
            .ok_or_else(|| Exception::throw_internal(ctx, "host bridge has been dropped"))
    }

    pub(crate) fn prelude(&self, ctx: &Ctx<'_>) -> rquickjs::Result<Rc<Prelude>> {
        self.prelude
            .borrow()
            .clone()
            .ok_or_else(|| Exception::throw_internal(ctx, "script engine is shutting down"))
    }

    /// Pins `object` for the host. `None` if the table is exhausted.
    pub(crate) fn pin<'js>(&self, ctx: &Ctx<'js>, object: Object<'js>) -> Option<ForeignHandle> {
        let handle = self.handles.borrow_mut().insert(Persistent::save(ctx, object));
        if let Some(handle) = handle {
            trace!(%handle, "pinned script object");
        }
        handle
    }

    pub(crate) fn restore<'js>(&self, ctx: &Ctx<'js>, handle: ForeignHandle) -> rquickjs::Result<Object<'js>> {
        let pinned = self.handles.borrow().get(handle).cloned();
        match pinned {
            Some(object) => object.restore(ctx),
            None => Err(Exception::throw_reference(
                ctx,
                &format!("{handle} is not pinned by this engine"),
            )),
        }
    }
}

/// Restores the previous active context when a call unwinds.
struct ActiveScope<'a> {
    cell: &'a Cell<Option<NonNull<qjs::JSContext>>>,
    previous: Option<NonNull<qjs::JSContext>>,
}

impl<'a> ActiveScope<'a> {
    fn enter(cell: &'a Cell<Option<NonNull<qjs::JSContext>>>, raw: NonNull<qjs::JSContext>) -> Self {
        let previous = cell.replace(Some(raw));
        Self { cell, previous }
    }
}

impl Drop for ActiveScope<'_> {
    fn drop(&mut self) {
        self.cell.set(self.previous);
    }
}

/// One script engine instance. Not `Send`: use one engine per thread.
pub struct NativeEngine {
    shared: Rc<EngineShared>,
    context: Context,
    #[allow(dead_code)] // Kept alive for context lifetime
    runtime: Runtime,
}

impl NativeEngine {
    /// Creates the runtime, applies `settings` and installs the host prelude.
    pub fn create(callbacks: Weak<dyn HostCallbacks>, settings: &EngineSettings) -> Result<Self, EngineError> {
        let runtime = Runtime::new().map_err(EngineError::Runtime)?;
        if settings.memory_limit > 0 {
            runtime.set_memory_limit(settings.memory_limit);
        }
        runtime.set_max_stack_size(settings.max_stack_size);
        runtime.set_gc_threshold(settings.gc_threshold);
        let context = Context::full(&runtime).map_err(EngineError::Runtime)?;

        let engine = Self {
            shared: Rc::new(EngineShared::new(callbacks, settings.clone())),
            context,
            runtime,
        };

        engine.enter(|ctx| {
            let installed = install_hooks(&ctx, &engine.shared).and_then(|hooks| Prelude::install(&ctx, hooks));
            match installed {
                Ok(prelude) => {
                    *engine.shared.prelude.borrow_mut() = Some(Rc::new(prelude));
                    Ok(())
                }
                Err(rquickjs::Error::Exception) => {
                    let thrown = ctx.catch();
                    let message = thrown
                        .as_exception()
                        .and_then(Exception::message)
                        .unwrap_or_else(|| String::from("prelude threw"));
                    Err(EngineError::Prelude(message))
                }
                Err(err) => Err(EngineError::Prelude(err.to_string())),
            }
        })?;

        debug!(
            memory_limit = settings.memory_limit,
            max_stack_size = settings.max_stack_size,
            "native engine created"
        );
        Ok(engine)
    }

    /// Runs `source` in the global scope and returns its completion value.
    pub fn run(&self, source: &str) -> TaggedValue {
        trace!(bytes = source.len(), "run");
        self.enter(|ctx| {
            let result = ctx.eval::<Value, _>(source);
            marshal::settle(&ctx, &self.shared, result)
        })
    }

    pub fn get_global(&self, name: &str) -> TaggedValue {
        self.enter(|ctx| {
            let result = ctx.globals().get::<_, Value>(name);
            marshal::settle(&ctx, &self.shared, result)
        })
    }

    /// Returns `Null`, or the error raised while assigning.
    pub fn set_global(&self, name: &str, value: &TaggedValue) -> TaggedValue {
        self.enter(|ctx| {
            let result = marshal::to_js(&ctx, &self.shared, value).and_then(|value| ctx.globals().set(name, value));
            marshal::settle_unit(&ctx, &self.shared, result)
        })
    }

    pub fn get_member(&self, target: ForeignHandle, name: &str) -> TaggedValue {
        self.enter(|ctx| {
            let result = self
                .shared
                .restore(&ctx, target)
                .and_then(|object| object.get::<_, Value>(name));
            marshal::settle(&ctx, &self.shared, result)
        })
    }

    pub fn set_member(&self, target: ForeignHandle, name: &str, value: &TaggedValue) -> TaggedValue {
        self.enter(|ctx| {
            // Converted first so a missing target still lets the proxies go.
            let result = marshal::to_js(&ctx, &self.shared, value)
                .and_then(|value| self.shared.restore(&ctx, target)?.set(name, value));
            marshal::settle_unit(&ctx, &self.shared, result)
        })
    }

    /// Calls `target[name](...args)` with `target` as `this`. `args` must be an `Array`.
    pub fn invoke_member(&self, target: ForeignHandle, name: &str, args: &TaggedValue) -> TaggedValue {
        self.enter(|ctx| {
            let result = self.call_member(&ctx, target, name, args);
            marshal::settle(&ctx, &self.shared, result)
        })
    }

    fn call_member<'js>(
        &self,
        ctx: &Ctx<'js>,
        target: ForeignHandle,
        name: &str,
        args: &TaggedValue,
    ) -> rquickjs::Result<Value<'js>> {
        // Arguments become script values before anything can fail, so every
        // slot they carry is owned by a proxy and comes back through the
        // collector whatever happens next.
        let args = marshal::to_js(ctx, &self.shared, args)?;
        let Some(args) = args.into_array() else {
            return Err(Exception::throw_type(ctx, "member arguments must be an array"));
        };
        let values = args.iter::<Value>().collect::<rquickjs::Result<Vec<_>>>()?;

        let object = self.shared.restore(ctx, target)?;
        let member: Value = object.get(name)?;
        let Some(function) = member.as_function().cloned() else {
            return Err(Exception::throw_type(ctx, &format!("{name} is not a function")));
        };
        function.call((This(object), Rest(values)))
    }

    /// The host no longer refers to `handle`. Unknown handles are ignored.
    pub fn release_handle(&self, handle: ForeignHandle) {
        let released = self.shared.handles.borrow_mut().remove(handle);
        if let Some(object) = released {
            trace!(%handle, "released script object");
            self.enter(move |_ctx| drop(object));
        }
    }

    /// Runs a full collection. Unreachable host proxies give their slots back.
    pub fn force_gc(&self) {
        self.enter(|ctx| ctx.run_gc());
    }

    /// Script objects currently pinned for the host.
    pub fn live_handles(&self) -> usize {
        self.shared.handles.borrow().len()
    }

    /// Runs `f` with the engine's context, reusing the context of an outer
    /// call when script has re-entered the host.
    fn enter<R>(&self, f: impl for<'js> FnOnce(Ctx<'js>) -> R) -> R {
        if let Some(raw) = self.shared.active.get() {
            // SAFETY: `active` is only set while an enclosing `Context::with` on
            // this thread holds the runtime, and `f` is generic over `'js` so
            // nothing borrowed from this context escapes the call.
            let ctx = unsafe { Ctx::from_raw(raw) };
            return f(ctx);
        }
        self.context.with(|ctx| {
            let _scope = ActiveScope::enter(&self.shared.active, ctx.as_raw());
            f(ctx)
        })
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        // Persistent references must not outlive the runtime.
        let prelude = self.shared.prelude.borrow_mut().take();
        let pinned = self.shared.handles.borrow_mut().drain();
        let leaked = pinned.len();
        self.enter(move |ctx| {
            drop(prelude);
            drop(pinned);
            ctx.run_gc();
        });
        debug!(released_handles = leaked, "native engine destroyed");
    }
}

/// The native functions behind the proxy traps.
fn install_hooks<'js>(ctx: &Ctx<'js>, shared: &Rc<EngineShared>) -> rquickjs::Result<Hooks<'js>> {
    let get = Function::new(ctx.clone(), {
        let shared = Rc::downgrade(shared);
        move |ctx: Ctx<'js>, slot: i32, name: String| -> rquickjs::Result<Value<'js>> {
            let shared = EngineShared::upgrade(&ctx, &shared)?;
            let slot = marshal::slot_arg(&ctx, slot)?;
            let reply = shared.host(&ctx)?.get_property(slot, &name);
            marshal::accept(&ctx, &shared, reply)
        }
    })?;

    let set = Function::new(ctx.clone(), {
        let shared = Rc::downgrade(shared);
        move |ctx: Ctx<'js>, slot: i32, name: String, value: Value<'js>| -> rquickjs::Result<()> {
            let shared = EngineShared::upgrade(&ctx, &shared)?;
            let slot = marshal::slot_arg(&ctx, slot)?;
            let host = shared.host(&ctx)?;
            let value = marshal::from_js(&ctx, &shared, value);
            let reply = host.set_property(slot, &name, &value);
            dispose(value);
            marshal::accept(&ctx, &shared, reply).map(drop)
        }
    })?;

    let invoke = Function::new(ctx.clone(), {
        let shared = Rc::downgrade(shared);
        move |ctx: Ctx<'js>, slot: i32, args: Array<'js>| -> rquickjs::Result<Value<'js>> {
            let shared = EngineShared::upgrade(&ctx, &shared)?;
            let slot = marshal::slot_arg(&ctx, slot)?;
            let host = shared.host(&ctx)?;
            let args = marshal::from_js(&ctx, &shared, args.into_value());
            let reply = host.invoke(slot, &args);
            dispose(args);
            marshal::accept(&ctx, &shared, reply)
        }
    })?;

    Ok(Hooks { get, set, invoke })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_wire::{alloc_array, alloc_string, Slot, Wire};

    #[derive(Default)]
    struct MockHost {
        removed: RefCell<Vec<Slot>>,
        assigned: RefCell<Vec<(Slot, String, String)>>,
        invoked: RefCell<Vec<(Slot, usize)>>,
        engine: RefCell<Weak<NativeEngine>>,
    }

    impl HostCallbacks for MockHost {
        fn remove_slot(&self, slot: Slot) {
            self.removed.borrow_mut().push(slot);
        }

        fn get_property(&self, slot: Slot, name: &str) -> TaggedValue {
            match name {
                "answer" => TaggedValue::integer(42),
                "greet" => TaggedValue::managed(Slot::new(100 + slot.index()).unwrap()),
                "fail" => TaggedValue::unknown_error(Some("host refused")),
                "nested" => match self.engine.borrow().upgrade() {
                    Some(engine) => engine.run("6 * 7"),
                    None => TaggedValue::unknown_error(None),
                },
                _ => TaggedValue::unknown_error(Some("no such member")),
            }
        }

        fn set_property(&self, slot: Slot, name: &str, value: &TaggedValue) -> TaggedValue {
            self.assigned
                .borrow_mut()
                .push((slot, name.to_owned(), format!("{value:?}")));
            TaggedValue::null()
        }

        fn invoke(&self, slot: Slot, args: &TaggedValue) -> TaggedValue {
            let Ok(Wire::Array(items)) = args.view() else {
                return TaggedValue::unknown_error(Some("arguments were not an array"));
            };
            self.invoked.borrow_mut().push((slot, items.len()));
            match items.first().map(TaggedValue::view) {
                Some(Ok(Wire::String(name))) => alloc_string(&format!("hello {name}")),
                _ => TaggedValue::null(),
            }
        }
    }

    fn engine_with_host() -> (Rc<MockHost>, Rc<NativeEngine>) {
        engine_with_settings(&EngineSettings::default())
    }

    fn engine_with_settings(settings: &EngineSettings) -> (Rc<MockHost>, Rc<NativeEngine>) {
        let host = Rc::new(MockHost::default());
        let callbacks: Weak<dyn HostCallbacks> = Rc::downgrade(&host) as Weak<dyn HostCallbacks>;
        let engine = Rc::new(NativeEngine::create(callbacks, settings).unwrap());
        *host.engine.borrow_mut() = Rc::downgrade(&engine);
        (host, engine)
    }

    fn check(value: TaggedValue, f: impl FnOnce(Wire<'_>)) {
        f(value.view().unwrap());
        dispose(value);
    }

    fn slot(index: u32) -> Slot {
        Slot::new(index).unwrap()
    }

    fn foreign(value: &TaggedValue) -> ForeignHandle {
        match value.view() {
            Ok(Wire::ForeignRef(Some(handle)) | Wire::ForeignError(Some(handle))) => handle,
            other => panic!("expected a foreign handle, got {other:?}"),
        }
    }

    fn error_message(engine: &NativeEngine, error: TaggedValue) -> String {
        let handle = foreign(&error);
        dispose(error);
        let message = engine.get_member(handle, "message");
        let text = match message.view() {
            Ok(Wire::String(text)) => text.to_owned(),
            other => panic!("expected message string, got {other:?}"),
        };
        dispose(message);
        engine.release_handle(handle);
        text
    }

    #[test]
    fn run_returns_primitives() {
        let (_host, engine) = engine_with_host();

        check(engine.run("null"), |v| assert!(matches!(v, Wire::Null)));
        check(engine.run("undefined"), |v| assert!(matches!(v, Wire::Null)));
        check(engine.run("true"), |v| assert!(matches!(v, Wire::Boolean(true))));
        check(engine.run("1 + 1"), |v| assert!(matches!(v, Wire::Integer(2))));
        check(engine.run("0.5"), |v| assert!(matches!(v, Wire::Number(n) if n == 0.5)));
        check(engine.run("'hi' + '!'"), |v| assert!(matches!(v, Wire::String("hi!"))));
        check(engine.run("new Date(86400000)"), |v| {
            assert!(matches!(v, Wire::Date(ms) if ms == 86_400_000.0))
        });
        check(engine.run("Symbol('x')"), |v| assert!(matches!(v, Wire::UnknownError(Some(_)))));
    }

    #[test]
    fn run_copies_arrays() {
        let (_host, engine) = engine_with_host();

        check(engine.run("[1, 'a', [true]]"), |v| {
            let Wire::Array(items) = v else { panic!("expected array") };
            assert_eq!(items.len(), 3);
            assert!(matches!(items[1].view(), Ok(Wire::String("a"))));
            let Ok(Wire::Array(inner)) = items[2].view() else { panic!("expected nested array") };
            assert!(matches!(inner[0].view(), Ok(Wire::Boolean(true))));
        });
        check(engine.run("const loop = []; loop.push(loop); loop"), |v| {
            assert!(matches!(v, Wire::Array(items) if items.len() == 1));
        });
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn objects_are_pinned_until_released() {
        let (_host, engine) = engine_with_host();

        let object = engine.run("({ a: 1, sum(x, y) { return x + y + this.a; } })");
        let handle = foreign(&object);
        dispose(object);
        assert_eq!(engine.live_handles(), 1);

        check(engine.get_member(handle, "a"), |v| assert!(matches!(v, Wire::Integer(1))));
        check(engine.set_member(handle, "a", &TaggedValue::integer(10)), |v| {
            assert!(matches!(v, Wire::Null))
        });

        let mut args = alloc_array(2);
        {
            let items = args.elements_mut().unwrap();
            items[0] = TaggedValue::integer(2);
            items[1] = TaggedValue::integer(3);
        }
        check(engine.invoke_member(handle, "sum", &args), |v| assert!(matches!(v, Wire::Integer(15))));

        let not_callable = engine.invoke_member(handle, "a", &args);
        assert!(not_callable.is_error());
        assert!(error_message(&engine, not_callable).contains("not a function"));
        dispose(args);

        engine.release_handle(handle);
        engine.release_handle(handle);
        assert_eq!(engine.live_handles(), 0);
        check(engine.get_member(handle, "a"), |v| assert!(matches!(v, Wire::ForeignError(Some(_)))));
    }

    #[test]
    fn script_exceptions_come_back_error_shaped() {
        let (_host, engine) = engine_with_host();

        let thrown = engine.run("null.x");
        assert!(matches!(thrown.view(), Ok(Wire::ForeignError(Some(_)))));
        assert!(!error_message(&engine, thrown).is_empty());

        check(engine.run("throw 'boom'"), |v| assert!(matches!(v, Wire::UnknownError(Some("boom")))));

        let syntax = engine.run("let = (");
        assert!(syntax.is_error());
        dispose(syntax);
    }

    #[test]
    #[allow(clippy::approx_constant)]
    fn globals_round_trip_and_report_setter_errors() {
        let (_host, engine) = engine_with_host();

        let mut foo = alloc_array(3);
        {
            let items = foo.elements_mut().unwrap();
            items[0] = alloc_string("foobar");
            items[1] = TaggedValue::number(3.14159);
            items[2] = TaggedValue::integer(42);
        }
        check(engine.set_global("foo", &foo), |v| assert!(matches!(v, Wire::Null)));
        dispose(foo);

        check(engine.run("foo[1] += 2.71828"), |_| {});
        check(engine.get_global("foo"), |v| {
            let Wire::Array(items) = v else { panic!("expected array") };
            assert!(matches!(items[0].view(), Ok(Wire::String("foobar"))));
            assert!(matches!(items[1].view(), Ok(Wire::Number(n)) if (n - 5.85987).abs() < 1e-9));
            assert!(matches!(items[2].view(), Ok(Wire::Integer(42))));
        });

        check(
            engine.run("Object.defineProperty(globalThis, 'locked', { set() { throw new Error('read only'); } }); 0"),
            |_| {},
        );
        let refused = engine.set_global("locked", &TaggedValue::integer(1));
        assert_eq!(error_message(&engine, refused), "read only");
    }

    #[test]
    fn host_proxies_call_back_into_the_host() {
        let (host, engine) = engine_with_host();
        check(engine.set_global("host", &TaggedValue::managed(slot(7))), |v| {
            assert!(matches!(v, Wire::Null))
        });

        check(engine.run("host.answer"), |v| assert!(matches!(v, Wire::Integer(42))));
        check(engine.run("host.answer = 5"), |v| assert!(matches!(v, Wire::Integer(5))));
        assert_eq!(
            host.assigned.borrow().as_slice(),
            &[(slot(7), String::from("answer"), String::from("Integer(5)"))]
        );

        check(engine.run("host.greet('bob')"), |v| assert!(matches!(v, Wire::String("hello bob"))));
        assert_eq!(host.invoked.borrow().as_slice(), &[(slot(107), 1)]);

        check(engine.run("host"), |v| assert!(matches!(v, Wire::ManagedRef(s) if s == slot(7))));
        check(engine.run("typeof host"), |v| assert!(matches!(v, Wire::String("function"))));
    }

    #[test]
    fn host_errors_are_thrown_into_script() {
        let (_host, engine) = engine_with_host();
        check(engine.set_global("host", &TaggedValue::managed(slot(3))), |_| {});

        check(engine.run("try { host.fail } catch (e) { e.message }"), |v| {
            assert!(matches!(v, Wire::String("host refused")))
        });
        let uncaught = engine.run("host.fail");
        assert_eq!(error_message(&engine, uncaught), "host refused");
    }

    #[test]
    fn unreachable_proxies_return_their_slots() {
        let (host, engine) = engine_with_host();
        check(engine.set_global("host", &TaggedValue::managed(slot(7))), |_| {});
        check(engine.run("host.greet"), |v| assert!(matches!(v, Wire::ManagedRef(s) if s == slot(107))));

        check(engine.run("host = undefined"), |_| {});
        engine.force_gc();

        let mut removed = host.removed.borrow().clone();
        removed.sort();
        assert_eq!(removed, vec![slot(7), slot(107)]);
    }

    #[test]
    fn slots_that_never_reach_script_are_handed_back() {
        let (host, engine) = engine_with_host();

        let mut inner = alloc_array(1);
        inner.elements_mut().unwrap()[0] = TaggedValue::managed(slot(6));
        let mut value = alloc_array(3);
        {
            let items = value.elements_mut().unwrap();
            items[0] = TaggedValue::foreign(ForeignHandle::new(999).unwrap());
            items[1] = TaggedValue::managed(slot(5));
            items[2] = inner;
        }
        let refused = engine.set_global("lost", &value);
        assert!(refused.is_error());
        dispose(refused);
        dispose(value);
        assert_eq!(host.removed.borrow().as_slice(), &[slot(5), slot(6)]);
    }

    #[test]
    fn failed_member_calls_let_their_arguments_go() {
        let (host, engine) = engine_with_host();
        let object = engine.run("({ count: 1, get broken() { throw new Error('nope'); } })");
        let handle = foreign(&object);
        dispose(object);

        for (name, index) in [("count", 11), ("broken", 12), ("missing", 13)] {
            let mut args = alloc_array(1);
            args.elements_mut().unwrap()[0] = TaggedValue::managed(slot(index));
            let failed = engine.invoke_member(handle, name, &args);
            assert!(failed.is_error());
            dispose(failed);
            dispose(args);
        }
        let released = engine.set_member(ForeignHandle::new(999).unwrap(), "x", &TaggedValue::managed(slot(14)));
        assert!(released.is_error());
        dispose(released);

        engine.force_gc();
        let mut removed = host.removed.borrow().clone();
        removed.sort();
        assert_eq!(removed, vec![slot(11), slot(12), slot(13), slot(14)]);
    }

    #[test]
    fn oversized_arrays_are_not_copied() {
        let (_host, engine) = engine_with_host();
        check(engine.run("const huge = []; huge.length = 2 ** 31 - 1; huge"), |v| {
            assert!(matches!(v, Wire::UnknownError(Some(message)) if message.contains("too long")))
        });

        let settings = EngineSettings {
            max_array_length: 2,
            max_array_depth: 1,
            ..EngineSettings::default()
        };
        let (_host, engine) = engine_with_settings(&settings);
        check(engine.run("[1, 2]"), |v| assert!(matches!(v, Wire::Array(items) if items.len() == 2)));
        check(engine.run("[1, 2, 3]"), |v| assert!(matches!(v, Wire::UnknownError(Some(_)))));
        check(engine.run("[[1]]"), |v| {
            let Wire::Array(items) = v else { panic!("expected array") };
            assert!(matches!(items[0].view(), Ok(Wire::UnknownError(Some(_)))));
        });
    }

    #[test]
    fn nested_calls_reuse_the_active_context() {
        let (_host, engine) = engine_with_host();
        check(engine.set_global("host", &TaggedValue::managed(slot(1))), |_| {});
        check(engine.run("host.nested + 1"), |v| assert!(matches!(v, Wire::Integer(43))));
    }

    #[test]
    fn dropping_with_pinned_objects_is_clean() {
        let (host, engine) = engine_with_host();
        check(engine.run("({ kept: true })"), |_| {});
        check(engine.set_global("host", &TaggedValue::managed(slot(9))), |_| {});
        assert_eq!(engine.live_handles(), 1);
        drop(engine);
        assert!(host.engine.borrow().upgrade().is_none());
    }
}
