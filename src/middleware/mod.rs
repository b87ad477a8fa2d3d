/*
 * Responsibility
 * - Public interface for middleware (re-exports)
 */
pub mod auth;
pub mod http;
