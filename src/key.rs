//! Cache keys and the default identity-based key derivation.
//!
//! Every memoized invocation is cached under an opaque [`CacheKey`]. Custom
//! key functions can derive one from anything hashable via [`CacheKey::of`].
//! The default derivation ([`default_cache_key`]) treats arguments by
//! identity: it threads them through a thread-shared trie where each argument
//! walks one edge keyed by its [`KeyAtom`], so two calls with the same
//! sequence of argument identities land on the same key.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque identity of one memoized invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(u64);

impl CacheKey {
    /// Derive a key by hashing an arbitrary value.
    ///
    /// This is the building block for custom `make_key` functions, e.g.
    /// keying a wrapper by its first argument only.
    pub fn of<K: Hash + ?Sized>(key: &K) -> Self {
        let mut hasher = ahash::AHasher::default();
        key.hash(&mut hasher);
        CacheKey(hasher.finish())
    }
}

/// One argument's contribution to the default cache key.
///
/// Primitive values participate by natural equality; shared handles
/// participate by allocation address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyAtom {
    /// Absent optional argument.
    Unit,
    /// Boolean value.
    Bool(bool),
    /// Character value.
    Char(char),
    /// Signed integer value.
    Int(i64),
    /// Unsigned integer value.
    Uint(u64),
    /// Text compared by content.
    Text(Rc<str>),
    /// Heap allocation compared by address.
    Address(usize),
}

/// Types usable as arguments of the default key function.
///
/// Handle implementations (`Rc`, `Arc`) key by allocation address: two
/// structurally equal but distinct allocations produce distinct keys. Keep
/// such handles alive for as long as their keys matter, since a dropped
/// handle's address may be reused by a later allocation.
pub trait KeyArg {
    /// The identity atom this argument contributes.
    fn key_atom(&self) -> KeyAtom;
}

macro_rules! int_key_arg {
    ($($ty:ty),*) => {
        $(impl KeyArg for $ty {
            fn key_atom(&self) -> KeyAtom {
                KeyAtom::Int(*self as i64)
            }
        })*
    };
}

macro_rules! uint_key_arg {
    ($($ty:ty),*) => {
        $(impl KeyArg for $ty {
            fn key_atom(&self) -> KeyAtom {
                KeyAtom::Uint(*self as u64)
            }
        })*
    };
}

int_key_arg!(i8, i16, i32, i64, isize);
uint_key_arg!(u8, u16, u32, u64, usize);

impl KeyArg for bool {
    fn key_atom(&self) -> KeyAtom {
        KeyAtom::Bool(*self)
    }
}

impl KeyArg for char {
    fn key_atom(&self) -> KeyAtom {
        KeyAtom::Char(*self)
    }
}

impl KeyArg for &str {
    fn key_atom(&self) -> KeyAtom {
        KeyAtom::Text(Rc::from(*self))
    }
}

impl KeyArg for String {
    fn key_atom(&self) -> KeyAtom {
        KeyAtom::Text(Rc::from(self.as_str()))
    }
}

impl<T: ?Sized> KeyArg for Rc<T> {
    fn key_atom(&self) -> KeyAtom {
        KeyAtom::Address(Rc::as_ptr(self) as *const u8 as usize)
    }
}

impl<T: ?Sized> KeyArg for Arc<T> {
    fn key_atom(&self) -> KeyAtom {
        KeyAtom::Address(Arc::as_ptr(self) as *const u8 as usize)
    }
}

impl<T: KeyArg> KeyArg for Option<T> {
    fn key_atom(&self) -> KeyAtom {
        match self {
            Some(value) => value.key_atom(),
            None => KeyAtom::Unit,
        }
    }
}

/// Argument tuples accepted by the default key function.
///
/// Implemented for every [`KeyArg`] type directly and for tuples of them up
/// to arity eight, plus the empty tuple for argument-less wrappers.
pub trait KeyArgs {
    /// Append this argument list's identity atoms in order.
    fn key_atoms(&self, atoms: &mut Vec<KeyAtom>);
}

impl<T: KeyArg> KeyArgs for T {
    fn key_atoms(&self, atoms: &mut Vec<KeyAtom>) {
        atoms.push(self.key_atom());
    }
}

impl KeyArgs for () {
    fn key_atoms(&self, _atoms: &mut Vec<KeyAtom>) {}
}

macro_rules! tuple_key_args {
    ($($name:ident),+) => {
        impl<$($name: KeyArg),+> KeyArgs for ($($name,)+) {
            fn key_atoms(&self, atoms: &mut Vec<KeyAtom>) {
                #[allow(non_snake_case)]
                let ($($name,)+) = self;
                $(atoms.push($name.key_atom());)+
            }
        }
    };
}

tuple_key_args!(A);
tuple_key_args!(A, B);
tuple_key_args!(A, B, C);
tuple_key_args!(A, B, C, D);
tuple_key_args!(A, B, C, D, E);
tuple_key_args!(A, B, C, D, E, F);
tuple_key_args!(A, B, C, D, E, F, G);
tuple_key_args!(A, B, C, D, E, F, G, H);

/// Shared trie behind the default key derivation. The root is the fixed
/// entry point; each atom walks one edge; terminal nodes own the keys.
struct KeyTrie {
    nodes: Vec<TrieNode>,
    next_key: u64,
}

#[derive(Default)]
struct TrieNode {
    key: Option<CacheKey>,
    children: HashMap<KeyAtom, usize, ahash::RandomState>,
}

impl KeyTrie {
    fn new() -> Self {
        KeyTrie {
            nodes: vec![TrieNode::default()],
            next_key: 0,
        }
    }

    fn key_for(&mut self, atoms: &[KeyAtom]) -> CacheKey {
        let mut node = 0;
        for atom in atoms {
            node = match self.nodes[node].children.get(atom).copied() {
                Some(next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.insert(atom.clone(), next);
                    next
                }
            };
        }
        if let Some(key) = self.nodes[node].key {
            return key;
        }
        self.next_key += 1;
        let key = CacheKey(self.next_key);
        self.nodes[node].key = Some(key);
        key
    }
}

thread_local! {
    static KEY_TRIE: RefCell<KeyTrie> = RefCell::new(KeyTrie::new());
}

/// Derive the default cache key for an argument list.
///
/// Two calls with the same sequence of argument identities yield the same
/// key; distinct allocations yield distinct keys even when structurally
/// equal; primitives compare by natural equality.
pub fn default_cache_key<A: KeyArgs + ?Sized>(args: &A) -> CacheKey {
    let mut atoms = Vec::new();
    args.key_atoms(&mut atoms);
    KEY_TRIE.with(|trie| trie.borrow_mut().key_for(&atoms))
}
