/*
 * Responsibility
 * - Authentication middleware for protected routes
 * - access: the Bearer/DPoP arbitrator
 * - challenge: WWW-Authenticate / DPoP-Nonce response construction
 */
pub mod access;
pub mod challenge;
