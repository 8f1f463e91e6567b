//! # tabtimer-core
//!
//! Page-context core of the tab timer: watches the media on one page, decides
//! whether it is live, on-demand, paused or finished, and keeps the document
//! title decorated with a countdown or elapsed clock.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. The host drives [`PageController`] with
//!   events and calls `run_due` when [`PageController::next_deadline`] passes.
//! - **Not thread-safe**: One controller per page context, owned by one loop.
//! - **Host behind traits**: The document, clock and preference store are
//!   [`Page`], [`Clock`] and [`PreferenceStore`]; [`sim`] provides scripted
//!   versions for tests and replays.
//! - **Graceful degradation**: Missing metadata, detached media or a failing
//!   store mean "no decoration" or "keep previous settings", never an error
//!   surfaced to the user.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabtimer_core::{ManualClock, PageController, ScriptedPage, StaticPreferences};
//!
//! let page = ScriptedPage::new("https://example.com/watch", "Clip");
//! let mut controller = PageController::new(page, ManualClock::new(0), StaticPreferences::default());
//! controller.boot();
//! controller.run_due();
//! ```

pub mod aggregate;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod live_start;
pub mod media;
pub mod page;
pub mod patterns;
pub mod platform;
pub mod scheduler;
pub mod session;
pub mod sim;
pub mod title;

// Re-export commonly used items at crate root
pub use aggregate::{merge_mute_reports, toggle_frames, toggle_mute_all, FrameMute};
pub use classifier::{Classification, Classifier, ClassifierTuning, Verdict};
pub use clock::{format_hms, Clock, ManualClock, SystemClock};
pub use config::{
    default_preferences_path, load_preferences, FilePreferences, PageConfig, PreferenceStore,
    Settings, SitePolicy, StaticPreferences,
};
pub use controller::{ControllerTuning, PageController, PageEvent};
pub use error::{Result, TabTimerError};
pub use live_start::{find_live_start, LiveStart, OriginSource};
pub use media::{MediaElement, MediaEventKind, MediaHandle, MediaId, MediaRegistry, MediaSnapshot};
pub use page::{Page, PageProbe};
pub use platform::{PlatformAdapter, PlatformRouter};
pub use scheduler::{Scheduler, Wake};
pub use session::{ResetReason, SessionState};
pub use sim::{PageSignals, ScriptedMedia, ScriptedPage};
pub use title::{decorate, strip_decoration, TitleRenderer};
pub use tabtimer_protocol::{
    ControlRequest, ControlResponse, PlaybackKind, PreferenceSnapshot, Request, Response,
    StatusReport,
};
