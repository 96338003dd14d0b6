// Library root
// -----------
// The binary (`main.rs`) wires these modules into the interactive import.
//
// Module responsibilities:
// - `api`: HTTP plumbing for the cluster admin API (endpoint, client,
//   resource paths, status classification).
// - `upload`: health check, upload with retries, deletion, file discovery.
// - `ui`: prompts, connection builder and the import flow.
// - `config`: run settings and their environment overrides.
// - `logging`: tracing subscriber setup.
pub mod api;
pub mod config;
pub mod logging;
pub mod ui;
pub mod upload;
