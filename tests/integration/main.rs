// Integration tests against a real Postgres database.
//
// All tests are #[ignore]d; run them with a database available:
//   DATABASE_URL=postgresql://... cargo test -- --ignored

mod billing_flow_test;
mod helpers;
mod race_condition_test;
