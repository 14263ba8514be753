use crate::{
    objects::object::{Object, ObjectType},
    table::Table,
};

/// A class declaration's runtime value (spec.md §3, "Class"): a name and a
/// method table keyed by interned method-name strings. Single inheritance
/// copies the superclass's table into the subclass's at `INHERIT` time
/// rather than chaining lookups, so method resolution after that point
/// never walks a superclass pointer.
#[repr(C)]
pub struct ObjectClass {
    pub object: Object,
    pub name: String,
    pub methods: Table,
}

impl ObjectClass {
    pub fn new(name: String) -> Box<Self> {
        Box::new(ObjectClass {
            object: Object::header(ObjectType::Class),
            name,
            methods: Table::new(),
        })
    }
}
