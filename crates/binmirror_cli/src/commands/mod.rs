pub(crate) mod categories;
pub(crate) mod ls;
pub(crate) mod meta;
pub(crate) mod migrate;
pub(crate) mod shared;
pub(crate) mod status;
pub(crate) mod sync;
pub(crate) mod worker;
