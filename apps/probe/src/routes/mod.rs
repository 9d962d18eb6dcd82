mod status;

pub use status::*;

macros_utils::routes! {
    route status_route,
    route probe_status_route,
    route version_route,
    route probe_version_route,
}
