//! Conversion between QuickJS values and tagged values.

use crate::callbacks::SlotGuard;
use crate::engine::EngineShared;
use rquickjs::{Array, Coerced, Ctx, Exception, Function, Object, Value};
use tether_wire::{alloc_array, alloc_string, dispose, Slot, TaggedValue, ValueType, Wire};
use tracing::{trace, warn};

/// Builds the script value for `value`. The caller keeps ownership of `value`.
///
/// A `ManagedRef` hands its slot to a new proxy; the slot comes back through
/// `remove_slot` once script drops that proxy.
pub(crate) fn to_js<'js>(ctx: &Ctx<'js>, shared: &EngineShared, value: &TaggedValue) -> rquickjs::Result<Value<'js>> {
    let wire = value
        .view()
        .map_err(|err| Exception::throw_internal(ctx, &err.to_string()))?;

    Ok(match wire {
        Wire::Null => Value::new_null(ctx.clone()),
        Wire::Boolean(value) => Value::new_bool(ctx.clone(), value),
        Wire::Integer(value) => Value::new_int(ctx.clone(), value),
        Wire::Number(value) => Value::new_float(ctx.clone(), value),
        Wire::String(text) => rquickjs::String::from_str(ctx.clone(), text)?.into_value(),
        Wire::Date(millis) => shared.prelude(ctx)?.make_date(ctx, millis)?,
        Wire::Array(items) => {
            let array = match Array::new(ctx.clone()) {
                Ok(array) => array,
                Err(err) => {
                    release_unwrapped(shared, items);
                    return Err(err);
                }
            };
            for (index, item) in items.iter().enumerate() {
                let converted = to_js(ctx, shared, item).and_then(|value| array.set(index, value));
                if let Err(err) = converted {
                    release_unwrapped(shared, &items[index + 1..]);
                    return Err(err);
                }
            }
            array.into_value()
        }
        Wire::ManagedRef(slot) | Wire::ManagedError(slot) => wrap_slot(ctx, shared, slot)?,
        Wire::ForeignRef(None) | Wire::ForeignError(None) => Value::new_null(ctx.clone()),
        Wire::ForeignRef(Some(handle)) | Wire::ForeignError(Some(handle)) => {
            shared.restore(ctx, handle)?.into_value()
        }
        Wire::UnknownError(message) => {
            Exception::from_message(ctx.clone(), message.unwrap_or("host call failed"))?.into_value()
        }
    })
}

/// Hands back the slots in `items` that never got a proxy. Without a proxy
/// no finalizer will ever report them.
fn release_unwrapped(shared: &EngineShared, items: &[TaggedValue]) {
    for item in items {
        match item.view() {
            Ok(Wire::ManagedRef(slot) | Wire::ManagedError(slot)) => {
                trace!(%slot, "host slot never reached script");
                if let Some(callbacks) = shared.callbacks().upgrade() {
                    callbacks.remove_slot(slot);
                }
            }
            Ok(Wire::Array(nested)) => release_unwrapped(shared, nested),
            _ => {}
        }
    }
}

fn wrap_slot<'js>(ctx: &Ctx<'js>, shared: &EngineShared, slot: Slot) -> rquickjs::Result<Value<'js>> {
    let guard = SlotGuard::new(slot, shared.callbacks());
    let token = Function::new(ctx.clone(), move || guard.slot().to_wire())?;
    shared.prelude(ctx)?.wrap(ctx, token, slot)
}

/// Encodes a script value. Never fails: problems come back as `UnknownError`.
pub(crate) fn from_js<'js>(ctx: &Ctx<'js>, shared: &EngineShared, value: Value<'js>) -> TaggedValue {
    encode(ctx, shared, value, 0).unwrap_or_else(|err| settle_error(ctx, shared, err))
}

fn encode<'js>(ctx: &Ctx<'js>, shared: &EngineShared, value: Value<'js>, depth: usize) -> rquickjs::Result<TaggedValue> {
    if value.type_of().is_void() {
        return Ok(TaggedValue::null());
    }
    if let Some(value) = value.as_bool() {
        return Ok(TaggedValue::boolean(value));
    }
    if let Some(value) = value.as_int() {
        return Ok(TaggedValue::integer(value));
    }
    if let Some(value) = value.as_float() {
        return Ok(TaggedValue::number(value));
    }
    if let Some(text) = value.as_string() {
        return Ok(alloc_string(&text.to_string()?));
    }
    match value.as_object() {
        Some(object) => encode_object(ctx, shared, object.clone(), depth),
        None => {
            warn!(kind = value.type_name(), "script value has no wire representation");
            let message = format!("cannot pass a script {} to the host", value.type_name());
            Ok(TaggedValue::unknown_error(Some(&message)))
        }
    }
}

fn encode_object<'js>(ctx: &Ctx<'js>, shared: &EngineShared, object: Object<'js>, depth: usize) -> rquickjs::Result<TaggedValue> {
    let prelude = shared.prelude(ctx)?;
    if let Some(slot) = prelude.slot_of(ctx, &object)? {
        return Ok(TaggedValue::managed(slot));
    }

    if object.is_array() {
        // Self-referencing arrays stop here too.
        if depth >= shared.settings().max_array_depth {
            return Ok(TaggedValue::unknown_error(Some("array nesting is too deep to copy")));
        }
        let Some(array) = object.into_array() else {
            return Ok(TaggedValue::null());
        };
        if array.len() > shared.settings().max_array_length {
            warn!(len = array.len(), "script array exceeds the copy limit");
            return Ok(TaggedValue::unknown_error(Some("array is too long to copy")));
        }
        let mut out = alloc_array(array.len());
        if out.value_type() != Ok(ValueType::Array) {
            return Ok(out);
        }
        return match fill_array(ctx, shared, &array, &mut out, depth) {
            Ok(()) => Ok(out),
            Err(err) => {
                dispose(out);
                Err(err)
            }
        };
    }

    if prelude.is_date(ctx, &object)? {
        return Ok(TaggedValue::date(prelude.date_value(ctx, &object)?));
    }

    match shared.pin(ctx, object) {
        Some(handle) => Ok(TaggedValue::foreign(handle)),
        None => Ok(TaggedValue::unknown_error(Some("foreign handle table is full"))),
    }
}

fn fill_array<'js>(
    ctx: &Ctx<'js>,
    shared: &EngineShared,
    array: &Array<'js>,
    out: &mut TaggedValue,
    depth: usize,
) -> rquickjs::Result<()> {
    let Some(slots) = out.elements_mut() else {
        return Ok(());
    };
    for (index, slot) in slots.iter_mut().enumerate() {
        let item: Value = array.get(index)?;
        *slot = encode(ctx, shared, item, depth + 1)?;
    }
    Ok(())
}

/// Encodes the outcome of a script operation that yields a value.
pub(crate) fn settle<'js>(ctx: &Ctx<'js>, shared: &EngineShared, result: rquickjs::Result<Value<'js>>) -> TaggedValue {
    match result {
        Ok(value) => from_js(ctx, shared, value),
        Err(err) => settle_error(ctx, shared, err),
    }
}

/// Encodes the outcome of a script operation with no result: `Null` on success.
pub(crate) fn settle_unit(ctx: &Ctx<'_>, shared: &EngineShared, result: rquickjs::Result<()>) -> TaggedValue {
    match result {
        Ok(()) => TaggedValue::null(),
        Err(err) => settle_error(ctx, shared, err),
    }
}

/// Turns a failed operation into an error-shaped value.
///
/// A thrown host proxy keeps its slot, a thrown object is pinned, anything
/// else is reduced to a message.
pub(crate) fn settle_error<'js>(ctx: &Ctx<'js>, shared: &EngineShared, err: rquickjs::Error) -> TaggedValue {
    if !matches!(err, rquickjs::Error::Exception) {
        return TaggedValue::unknown_error(Some(&err.to_string()));
    }

    let thrown = ctx.catch();
    if let Some(object) = thrown.as_object() {
        if let Ok(prelude) = shared.prelude(ctx) {
            if let Ok(Some(slot)) = prelude.slot_of(ctx, object) {
                return TaggedValue::managed_error(slot);
            }
        }
        if let Some(handle) = shared.pin(ctx, object.clone()) {
            return TaggedValue::foreign_error(handle);
        }
    }

    let message = match thrown.get::<Coerced<String>>() {
        Ok(Coerced(text)) => text,
        Err(_) => String::from("script threw a value that cannot be printed"),
    };
    TaggedValue::unknown_error(Some(&message))
}

/// Converts a host reply for script. Error-shaped replies are thrown.
/// The reply is disposed either way.
pub(crate) fn accept<'js>(ctx: &Ctx<'js>, shared: &EngineShared, reply: TaggedValue) -> rquickjs::Result<Value<'js>> {
    let result = if reply.is_error() {
        match to_js(ctx, shared, &reply) {
            Ok(thrown) => Err(ctx.throw(thrown)),
            Err(err) => Err(err),
        }
    } else {
        to_js(ctx, shared, &reply)
    };
    dispose(reply);
    result
}

/// Slot numbers arrive from the prelude as plain numbers.
pub(crate) fn slot_arg(ctx: &Ctx<'_>, raw: i32) -> rquickjs::Result<Slot> {
    Slot::from_wire(raw).ok_or_else(|| Exception::throw_range(ctx, "invalid host slot"))
}
