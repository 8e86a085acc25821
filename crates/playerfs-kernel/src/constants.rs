//! Player layout constants.
//!
//! These paths and names are shared with the emulator runtime and with
//! state saved by earlier sessions, so they must not drift.

/// Writable user data root (configuration, save states, uploads).
pub const DEFAULT_USERDATA_ROOT: &str = "/home/web_user/retroarch/userdata";

/// Bundled frontend assets.
pub const DEFAULT_BUNDLE_ROOT: &str = "/home/web_user/retroarch/bundle";

/// Initial content (ROM, configuration, optional snapshot).
pub const DEFAULT_CONTENT_ROOT: &str = "/home/web_user/content";

/// Runtime configuration file name, both in the content root and in
/// user data.
pub const CONFIG_FILE: &str = "retroarch.cfg";

/// Prior-session snapshot as shipped in the content root.
pub const ENTRY_STATE_FILE: &str = "entry_state";

/// Save state directory under user data.
pub const STATES_DIR: &str = "states";

/// Suffix of the staged snapshot: `<content base>.state1.entry`.
pub const ENTRY_STATE_SUFFIX: &str = ".state1.entry";

/// Upload directory under user data.
pub const UPLOAD_DIR: &str = "content";

/// Input movie file under user data.
pub const MOVIE_FILE: &str = "movie.bsv";

/// Directory index document served next to the bundled assets.
pub const BUNDLE_INDEX_FILE: &str = ".index-xhr";

/// Default external runtime program.
pub const DEFAULT_RUNTIME_PROGRAM: &str = "retroarch";

/// Mode for directories created during staging and upload.
pub const DIR_MODE: u32 = 0o755;
