//! Script-side support installed once per engine.
//!
//! Host objects are exposed as `Proxy` objects over an empty function, so
//! they are both property bags and callables (method references). Each proxy
//! holds the native token whose finalizer returns the slot to the host.

use rquickjs::{Ctx, Function, Object, Persistent, Value};
use tether_wire::Slot;

const SOURCE: &str = r#"
(function (hostGet, hostSet, hostInvoke) {
    "use strict";
    const slots = new WeakMap();

    function wrap(token, slot) {
        const handler = {
            token,
            get(target, name) {
                return typeof name === "symbol" ? undefined : hostGet(slot, name);
            },
            set(target, name, value) {
                if (typeof name === "symbol") {
                    return false;
                }
                hostSet(slot, name, value);
                return true;
            },
            apply(target, self, args) {
                return hostInvoke(slot, args);
            },
        };
        const proxy = new Proxy(function () {}, handler);
        slots.set(proxy, slot);
        return proxy;
    }

    return {
        wrap,
        slotOf(value) {
            const slot = slots.get(value);
            return slot === undefined ? -1 : slot;
        },
        isDate(value) {
            return value instanceof Date;
        },
        makeDate(millis) {
            return new Date(millis);
        },
        dateValue(date) {
            return date.getTime();
        },
    };
})
"#;

/// Native functions the proxy traps call.
pub(crate) struct Hooks<'js> {
    pub get: Function<'js>,
    pub set: Function<'js>,
    pub invoke: Function<'js>,
}

pub(crate) struct Prelude {
    wrap: Persistent<Function<'static>>,
    slot_of: Persistent<Function<'static>>,
    is_date: Persistent<Function<'static>>,
    make_date: Persistent<Function<'static>>,
    date_value: Persistent<Function<'static>>,
}

impl Prelude {
    pub fn install<'js>(ctx: &Ctx<'js>, hooks: Hooks<'js>) -> rquickjs::Result<Self> {
        let factory: Function = ctx.eval(SOURCE)?;
        let exports: Object = factory.call((hooks.get, hooks.set, hooks.invoke))?;
        let export = |name: &str| -> rquickjs::Result<Persistent<Function<'static>>> {
            let function: Function = exports.get(name)?;
            Ok(Persistent::save(ctx, function))
        };

        Ok(Self {
            wrap: export("wrap")?,
            slot_of: export("slotOf")?,
            is_date: export("isDate")?,
            make_date: export("makeDate")?,
            date_value: export("dateValue")?,
        })
    }

    pub fn wrap<'js>(&self, ctx: &Ctx<'js>, token: Function<'js>, slot: Slot) -> rquickjs::Result<Value<'js>> {
        self.wrap.clone().restore(ctx)?.call((token, slot.to_wire()))
    }

    /// The slot behind `object` if it is one of our host proxies.
    pub fn slot_of<'js>(&self, ctx: &Ctx<'js>, object: &Object<'js>) -> rquickjs::Result<Option<Slot>> {
        let raw: i32 = self.slot_of.clone().restore(ctx)?.call((object.clone(),))?;
        Ok(Slot::from_wire(raw))
    }

    pub fn is_date<'js>(&self, ctx: &Ctx<'js>, object: &Object<'js>) -> rquickjs::Result<bool> {
        self.is_date.clone().restore(ctx)?.call((object.clone(),))
    }

    pub fn make_date<'js>(&self, ctx: &Ctx<'js>, millis: f64) -> rquickjs::Result<Value<'js>> {
        self.make_date.clone().restore(ctx)?.call((millis,))
    }

    pub fn date_value<'js>(&self, ctx: &Ctx<'js>, object: &Object<'js>) -> rquickjs::Result<f64> {
        self.date_value.clone().restore(ctx)?.call((object.clone(),))
    }
}
