//! Integration tests for spsync-graph
//!
//! Uses wiremock to simulate the Microsoft Graph API and the identity
//! platform, and verifies end-to-end behavior of token acquisition, site and
//! library lookup, folder creation, uploads and retry handling.

mod common;

mod test_auth;
mod test_folders;
mod test_retry;
mod test_sites;
mod test_upload;
