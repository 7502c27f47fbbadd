//! Receiver strategies decide how a freshly captured value is merged into
//! the mix, given whatever was previously assigned to the same name.
//! Grounded on `core/model/receiver.py`'s `Rx` hierarchy.

use crate::value::Value;

/// Receives a freshly captured value plus the previous assignment (if any)
/// and decides what ends up in the mix. `fetch` runs the fragment's
/// capture/validate/transform pipeline — call it at most once per `receive`.
pub trait Rx: Send + Sync {
    fn receive(&self, fetch: &mut dyn FnMut() -> Value, prev: Option<&Value>) -> Value;
}

/// Default: overwrite. `fetch`'s value replaces whatever was there.
pub struct DefaultRx;

impl Rx for DefaultRx {
    fn receive(&self, fetch: &mut dyn FnMut() -> Value, _prev: Option<&Value>) -> Value {
        fetch()
    }
}

/// Counts how many times the fragment was captured, ignoring the captured
/// value itself.
pub struct CountRx;

impl Rx for CountRx {
    fn receive(&self, _fetch: &mut dyn FnMut() -> Value, prev: Option<&Value>) -> Value {
        Value::Count(prev.and_then(Value::as_count).unwrap_or(0) + 1)
    }
}

/// Appends every captured value to a running list.
pub struct AccumRx;

impl Rx for AccumRx {
    fn receive(&self, fetch: &mut dyn FnMut() -> Value, prev: Option<&Value>) -> Value {
        let mut list = prev.and_then(Value::as_list).map(<[Value]>::to_vec).unwrap_or_default();
        list.push(fetch());
        Value::List(list)
    }
}

/// Ignores the capture entirely; always assigns a fixed value.
pub struct ConstRx {
    value: Value,
}

impl ConstRx {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Rx for ConstRx {
    fn receive(&self, _fetch: &mut dyn FnMut() -> Value, _prev: Option<&Value>) -> Value {
        self.value.clone()
    }
}

/// Sums every captured count, starting from 0.
pub struct AddRx;

impl Rx for AddRx {
    fn receive(&self, fetch: &mut dyn FnMut() -> Value, prev: Option<&Value>) -> Value {
        let running = prev.and_then(Value::as_count).unwrap_or(0);
        let num = fetch().as_count().unwrap_or(0);
        Value::Count(running + num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_rx_increments_from_none() {
        let rx = CountRx;
        let first = rx.receive(&mut || Value::Str(String::new()), None);
        let second = rx.receive(&mut || Value::Str(String::new()), Some(&first));
        assert_eq!(second.as_count(), Some(2));
    }

    #[test]
    fn accum_rx_appends_in_order() {
        let rx = AccumRx;
        let a = rx.receive(&mut || Value::Str("a".to_string()), None);
        let b = rx.receive(&mut || Value::Str("b".to_string()), Some(&a));
        let list = b.as_list().unwrap();
        assert_eq!(list[0].as_str(), Some("a"));
        assert_eq!(list[1].as_str(), Some("b"));
    }

    #[test]
    fn add_rx_sums_captures() {
        let rx = AddRx;
        let a = rx.receive(&mut || Value::Count(3), None);
        let b = rx.receive(&mut || Value::Count(4), Some(&a));
        assert_eq!(b.as_count(), Some(7));
    }
}
