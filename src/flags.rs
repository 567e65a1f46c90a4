//! Package and object flag bits.

pub mod package {
    pub const ALLOW_DOWNLOAD:   u32 = 0x0000_0001;
    pub const CLIENT_OPTIONAL:  u32 = 0x0000_0002;
    pub const SERVER_SIDE_ONLY: u32 = 0x0000_0004;
    pub const BROKEN_LINKS:     u32 = 0x0000_0008;
    pub const UNSECURE:         u32 = 0x0000_0010;
    pub const NEED:             u32 = 0x0000_8000;
}

pub mod object {
    pub const TRANSACTIONAL:    u32 = 0x0000_0001;
    pub const UNREACHABLE:      u32 = 0x0000_0002;
    pub const PUBLIC:           u32 = 0x0000_0004;
    pub const TAG_IMP:          u32 = 0x0000_0008;
    pub const TAG_EXP:          u32 = 0x0000_0010;
    pub const SOURCE_MODIFIED:  u32 = 0x0000_0020;
    pub const TAG_GARBAGE:      u32 = 0x0000_0040;
    pub const NEED_LOAD:        u32 = 0x0000_0200;
    pub const HIGHLIGHTED_NAME: u32 = 0x0000_0400;
    pub const IN_SINGULAR_FUNC: u32 = 0x0000_0800;
    pub const SUPPRESS:         u32 = 0x0000_1000;
    pub const IN_END_STATE:     u32 = 0x0000_2000;
    pub const TRANSIENT:        u32 = 0x0000_4000;
    pub const PRE_LOADING:      u32 = 0x0000_8000;
    pub const LOAD_FOR_CLIENT:  u32 = 0x0001_0000;
    pub const LOAD_FOR_SERVER:  u32 = 0x0002_0000;
    pub const LOAD_FOR_EDIT:    u32 = 0x0004_0000;
    pub const STANDALONE:       u32 = 0x0008_0000;
    pub const NOT_FOR_CLIENT:   u32 = 0x0010_0000;
    pub const NOT_FOR_SERVER:   u32 = 0x0020_0000;
    pub const NOT_FOR_EDIT:     u32 = 0x0040_0000;
    pub const DESTROYED:        u32 = 0x0080_0000;
    pub const NEED_POST_LOAD:   u32 = 0x0100_0000;
    pub const HAS_STACK:        u32 = 0x0200_0000;
    pub const NATIVE:           u32 = 0x0400_0000;
    pub const MARKED:           u32 = 0x0800_0000;
    pub const ERROR_SHUTDOWN:   u32 = 0x1000_0000;
    pub const DEBUG_POST_LOAD:  u32 = 0x2000_0000;
    pub const DEBUG_SERIALIZE:  u32 = 0x4000_0000;
    pub const DEBUG_DESTROY:    u32 = 0x8000_0000;
}

/// Flags given to names, imports and package exports created implicitly.
pub const PACKAGE_OBJECT_FLAGS: u32 =
    object::PUBLIC | object::LOAD_FOR_CLIENT | object::LOAD_FOR_SERVER | object::LOAD_FOR_EDIT;

/// Function flag bits stored in a `Function` field record.
pub mod function {
    pub const FINAL:         u32 = 1 << 0;
    pub const DEFINED:       u32 = 1 << 1;
    pub const ITERATOR:      u32 = 1 << 2;
    pub const LATENT:        u32 = 1 << 3;
    pub const PRE_OPERATOR:  u32 = 1 << 4;
    pub const SINGULAR:      u32 = 1 << 5;
    pub const NET:           u32 = 1 << 6;
    pub const NET_RELIABLE:  u32 = 1 << 7;
    pub const SIMULATED:     u32 = 1 << 8;
    pub const EXEC:          u32 = 1 << 9;
    pub const NATIVE:        u32 = 1 << 10;
    pub const EVENT:         u32 = 1 << 11;
    pub const OPERATOR:      u32 = 1 << 12;
    pub const STATIC:        u32 = 1 << 13;
    pub const NO_EXPORT:     u32 = 1 << 14;
    pub const CONST:         u32 = 1 << 15;
    pub const INVARIANT:     u32 = 1 << 16;
    pub const PROTECTED:     u32 = 1 << 19;
    pub const DELEGATE:      u32 = 1 << 20;
}

/// Property flag bits stored in a property field record.
pub mod property {
    pub const EDIT:          u32 = 0x0000_0001;
    pub const CONST:         u32 = 0x0000_0002;
    pub const INPUT:         u32 = 0x0000_0004;
    pub const EXPORT_OBJECT: u32 = 0x0000_0008;
    pub const OPTIONAL_PARM: u32 = 0x0000_0010;
    pub const NET:           u32 = 0x0000_0020;
    pub const CONST_REF:     u32 = 0x0000_0040;
    pub const PARM:          u32 = 0x0000_0080;
    pub const OUT_PARM:      u32 = 0x0000_0100;
    pub const SKIP_PARM:     u32 = 0x0000_0200;
    pub const RETURN_PARM:   u32 = 0x0000_0400;
    pub const COERCE_PARM:   u32 = 0x0000_0800;
    pub const NATIVE:        u32 = 0x0000_1000;
    pub const TRANSIENT:     u32 = 0x0000_2000;
    pub const CONFIG:        u32 = 0x0000_4000;
    pub const LOCALIZED:     u32 = 0x0000_8000;
}

pub mod state {
    pub const EDITABLE:  u32 = 0x0000_0001;
    pub const AUTO:      u32 = 0x0000_0002;
    pub const SIMULATED: u32 = 0x0000_0004;
}

/// Renders the set bits of `value` using `names`.
pub fn describe(value: u32, names: &[(u32, &str)]) -> Vec<String> {
    names
        .iter()
        .filter(|(mask, _)| value & mask != 0)
        .map(|(_, name)| name.to_string())
        .collect()
}

pub const OBJECT_FLAG_NAMES: &[(u32, &str)] = &[
    (object::TRANSACTIONAL,    "Transactional"),
    (object::UNREACHABLE,      "Unreachable"),
    (object::PUBLIC,           "Public"),
    (object::TAG_IMP,          "TagImp"),
    (object::TAG_EXP,          "TagExp"),
    (object::SOURCE_MODIFIED,  "SourceModified"),
    (object::TAG_GARBAGE,      "TagGarbage"),
    (object::NEED_LOAD,        "NeedLoad"),
    (object::HIGHLIGHTED_NAME, "HighlightedName"),
    (object::IN_SINGULAR_FUNC, "InSingularFunc"),
    (object::SUPPRESS,         "Suppress"),
    (object::IN_END_STATE,     "InEndState"),
    (object::TRANSIENT,        "Transient"),
    (object::PRE_LOADING,      "PreLoading"),
    (object::LOAD_FOR_CLIENT,  "LoadForClient"),
    (object::LOAD_FOR_SERVER,  "LoadForServer"),
    (object::LOAD_FOR_EDIT,    "LoadForEdit"),
    (object::STANDALONE,       "Standalone"),
    (object::NOT_FOR_CLIENT,   "NotForClient"),
    (object::NOT_FOR_SERVER,   "NotForServer"),
    (object::NOT_FOR_EDIT,     "NotForEdit"),
    (object::DESTROYED,        "Destroyed"),
    (object::NEED_POST_LOAD,   "NeedPostLoad"),
    (object::HAS_STACK,        "HasStack"),
    (object::NATIVE,           "Native"),
    (object::MARKED,           "Marked"),
    (object::ERROR_SHUTDOWN,   "ErrorShutdown"),
    (object::DEBUG_POST_LOAD,  "DebugPostLoad"),
    (object::DEBUG_SERIALIZE,  "DebugSerialize"),
    (object::DEBUG_DESTROY,    "DebugDestroy"),
];

pub const PACKAGE_FLAG_NAMES: &[(u32, &str)] = &[
    (package::ALLOW_DOWNLOAD,   "AllowDownload"),
    (package::CLIENT_OPTIONAL,  "ClientOptional"),
    (package::SERVER_SIDE_ONLY, "ServerSideOnly"),
    (package::BROKEN_LINKS,     "BrokenLinks"),
    (package::UNSECURE,         "Unsecure"),
    (package::NEED,             "Need"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_object_flags_value() {
        assert_eq!(PACKAGE_OBJECT_FLAGS, 0x0007_0004);
    }

    #[test]
    fn describe_lists_set_bits() {
        let names = describe(PACKAGE_OBJECT_FLAGS, OBJECT_FLAG_NAMES);
        assert_eq!(names, ["Public", "LoadForClient", "LoadForServer", "LoadForEdit"]);
    }
}
