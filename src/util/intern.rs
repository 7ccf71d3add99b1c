use std::{fmt, num::NonZeroU32, sync::Arc};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// A handle to an interned lexeme. To retrieve the `&str`, use
/// [`TokenMap::get`].
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    // Here we use a NonZeroU32 to leverage niche layout optimization.
    handle: NonZeroU32,
}

impl Id {
    pub(crate) const fn from_raw(raw: u32) -> Id {
        match NonZeroU32::new(raw) {
            Some(handle) => Id { handle },
            None => panic!("id handles start at 1"),
        }
    }

    fn index(self) -> usize {
        self.handle.get() as usize - 1
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.handle)
    }
}

/// Names the verifier needs to recognize without a lookup. They are interned
/// first, in this order, by [`TokenMap::new`].
pub mod well_known {
    use super::Id;

    pub const U8: Id = Id::from_raw(1);
    pub const U16: Id = Id::from_raw(2);
    pub const U32: Id = Id::from_raw(3);
    pub const U64: Id = Id::from_raw(4);
    pub const I8: Id = Id::from_raw(5);
    pub const I16: Id = Id::from_raw(6);
    pub const I32: Id = Id::from_raw(7);
    pub const I64: Id = Id::from_raw(8);
    pub const BOOL: Id = Id::from_raw(9);
    pub const LEN: Id = Id::from_raw(10);

    pub const ALL: &[(Id, &str)] = &[
        (U8, "u8"),
        (U16, "u16"),
        (U32, "u32"),
        (U64, "u64"),
        (I8, "i8"),
        (I16, "i16"),
        (I32, "i32"),
        (I64, "i64"),
        (BOOL, "bool"),
        (LEN, "len"),
    ];
}

#[derive(Default)]
struct Table {
    map: FxHashMap<Arc<str>, Id>,
    vec: Vec<Arc<str>>,
}

/// The append-only table of identifiers and literals shared by every file
/// compiled together.
///
/// Interning takes `&self`: concurrent first sightings of the same lexeme
/// (e.g. from files lexed on different workers) resolve to a single [`Id`].
pub struct TokenMap {
    table: RwLock<Table>,
}

impl TokenMap {
    pub fn new() -> TokenMap {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> TokenMap {
        let map = TokenMap {
            table: RwLock::new(Table {
                map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
                vec: Vec::with_capacity(capacity),
            }),
        };
        for &(expected, name) in well_known::ALL {
            let id = map.intern(name);
            assert_eq!(id, expected, "well-known name {name} out of order");
        }
        map
    }

    pub fn len(&self) -> usize {
        self.table.read().vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interns the provided lexeme, returning a handle which can be used to
    /// retrieve it later.
    pub fn intern(&self, lexeme: &str) -> Id {
        if let Some(&id) = self.table.read().map.get(lexeme) {
            return id;
        }
        let mut table = self.table.write();
        // Another writer may have won the race between the two locks.
        if let Some(&id) = table.map.get(lexeme) {
            return id;
        }
        let len = u32::try_from(table.vec.len()).expect("token map out of capacity");
        let id = Id::from_raw(len + 1);
        let key: Arc<str> = Arc::from(lexeme);
        table.vec.push(Arc::clone(&key));
        table.map.insert(key, id);
        id
    }

    /// Returns the lexeme previously interned as `id`, if any.
    pub fn lookup(&self, lexeme: &str) -> Option<Id> {
        self.table.read().map.get(lexeme).copied()
    }

    /// Returns the corresponding lexeme for the provided [`Id`].
    /// Panics if not found.
    pub fn get(&self, id: Id) -> Arc<str> {
        Arc::clone(&self.table.read().vec[id.index()])
    }
}

impl Default for TokenMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TokenMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read();
        let mut map = f.debug_map();
        for (i, lexeme) in table.vec.iter().enumerate() {
            map.entry(&(i + 1), lexeme);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn intern() {
        let tm = TokenMap::new();

        let hello1 = tm.intern("hello");
        let world1 = tm.intern("world");
        let bang1 = tm.intern("!");

        let hello2 = tm.intern("hello");
        let world2 = tm.intern("world");
        let bang2 = tm.intern("!");

        assert_eq!(tm.get(hello1), tm.get(hello2));
        assert_eq!(tm.get(world1), tm.get(world2));
        assert_eq!(tm.get(bang1), tm.get(bang2));

        assert_eq!(hello1, hello2);
        assert_eq!(world1, world2);
        assert_eq!(bang1, bang2);
        assert_ne!(hello1, world1);
    }

    #[test]
    fn well_known_names() {
        let tm = TokenMap::new();
        for &(id, name) in well_known::ALL {
            assert_eq!(tm.intern(name), id);
            assert_eq!(&*tm.get(id), name);
        }
        assert_eq!(tm.lookup("decode"), None);
    }

    #[test]
    fn concurrent_first_sightings() {
        let tm = TokenMap::new();
        let ids: Vec<Vec<Id>> = thread::scope(|s| {
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        (0..64)
                            .map(|n| tm.intern(&format!("name{n}")))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });
        for other in &ids[1..] {
            assert_eq!(&ids[0], other);
        }
        assert_eq!(tm.len(), well_known::ALL.len() + 64);
    }
}
