//! Tests for the `#[derive(Adopt)]` macro.

use std::marker::PhantomData;

use shptr::{Adopt, EnableSharedFromThis, Shared, WeakThis};

/// No self reference: an empty impl.
#[derive(Adopt)]
struct Plain {
    value: i32,
}

#[derive(Adopt)]
enum Message {
    Ping,
    Text(String),
    Move { x: i32, y: i32 },
}

/// Self reference in a tuple struct.
#[derive(Adopt)]
struct Handle(u8, WeakThis<Handle>);

/// Self reference in a generic struct.
#[derive(Adopt)]
struct Slot<T: 'static> {
    value: T,
    this: shptr::WeakThis<Self>,
}

/// Two weak fields of the same type; the marked one is the self reference.
#[derive(Adopt)]
struct Linked {
    #[shptr(weak_this)]
    me: WeakThis<Linked>,
    other: WeakThis<Linked>,
}

mod renamed {
    pub use shptr as pointers;
}

#[derive(Adopt)]
#[shptr(crate = renamed::pointers)]
struct ViaPath {
    this: WeakThis<Self>,
    _marker: PhantomData<u8>,
}

#[test]
fn test_plain_struct_is_not_self_referential() {
    const { assert!(!<Plain as Adopt>::SELF_REFERENTIAL) };
    let p = Shared::new(Plain { value: 3 });
    assert_eq!(p.value, 3);
    assert_eq!(Shared::weak_count(&p), 0);
}

#[test]
fn test_enum() {
    const { assert!(!<Message as Adopt>::SELF_REFERENTIAL) };
    let messages = [
        Shared::new(Message::Ping),
        Shared::new(Message::Text(String::from("hi"))),
        Shared::new(Message::Move { x: 1, y: -1 }),
    ];
    let texts = messages
        .iter()
        .filter(|m| matches!(***m, Message::Text(_)))
        .count();
    assert_eq!(texts, 1);
    if let Message::Move { x, y } = &*messages[2] {
        assert_eq!(x + y, 0);
    }
}

#[test]
fn test_tuple_struct_self_reference() {
    const { assert!(<Handle as Adopt>::SELF_REFERENTIAL) };
    let h = Shared::new(Handle(9, WeakThis::new()));
    let again = h.shared_from_this().unwrap();
    assert_eq!(again.0, 9);
    assert!(Shared::ptr_eq(&h, &again));
}

#[test]
fn test_generic_struct_self_reference() {
    let slot = Shared::new(Slot {
        value: String::from("generic"),
        this: WeakThis::new(),
    });
    assert!(slot.this.is_installed());
    assert_eq!(slot.shared_from_this().unwrap().value, "generic");
}

#[test]
fn test_marked_field_wins() {
    let a = Shared::new(Linked {
        me: WeakThis::new(),
        other: WeakThis::new(),
    });
    assert!(a.me.is_installed());
    assert!(!a.other.is_installed());
    assert!(a.weak_this().get().ptr_eq(&Shared::downgrade(&a)));
}

#[test]
fn test_crate_path_attribute() {
    let v = Shared::new(ViaPath {
        this: WeakThis::new(),
        _marker: PhantomData,
    });
    assert!(!v.weak_from_this().expired());
}
