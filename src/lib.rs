/*!
# Expense Tracker

A browser-based expense and project tracking application, built in Rust.

## Overview

Users sign in, create *projects*, organize each project into *sections* and
record line-item *expenses* (items) inside sections. Every project shows a
running total computed from all of its items.

## Architecture

### Web Layer (feature `web`)
- **Technologies**: axum, server-rendered handlebars templates
- **Key Components**:
  - Auth gate - session cookie middleware guarding every project route
  - Login - email/password sign-in and sign-up, federated sign-in
  - Dashboard - both project collections with per-project totals
  - Project detail - metadata editing, sections, and the shared item form

### Core
- Document store - hierarchical collections behind the [`store::DocumentStore`] trait
- Path resolution - the single place deciding between the `projects` and
  `expenses` roots ([`paths::resolve_collection_root`])
- Tracker - project, section and item operations, and totals behind
  [`tracker::TotalStrategy`]
- Draft/snapshot - local edits compared against the last persisted value
- Section state - expand/collapse and add-vs-edit selection of the item form

### Data Persistence Layer
- Store snapshot with Gzip compression and bincode serialization
- Accounts in a JSON file with Argon2 password hashes

## Modules

- **model**: Project, Section, Item and Collaborator records
- **paths**: Collection roots and document path construction
- **store**: Document store trait and the in-memory implementation
- **saving**: Store snapshot persistence with compression
- **tracker**: Project/section/item operations and totals
- **draft**: Draft/snapshot pair for editable records
- **section**: Per-section UI state machine
- **login**: Accounts, sessions and sign-in flows
- **federated**: Authorization-code sign-in against an external provider
- **config**: Environment-driven settings
- **views**: Page templates (feature `web`)
- **app**: Routing and middleware (feature `web`)

## Routes

- `/` - Redirects to the dashboard or the login page
- `/login`, `/login/federated`, `/login/federated/callback`, `/logout`
- `/dashboard` - Project lists with totals
- `/project/new` - New project form
- `/project/{project_id}` - Project detail, with nested section and item forms
*/

pub mod app;
pub mod config;
pub mod draft;
pub mod error;
pub mod federated;
pub mod login;
pub mod model;
pub mod paths;
pub mod saving;
pub mod section;
pub mod store;
pub mod tracker;
pub mod views;

pub use error::{AppError, Result};
pub use paths::{CollectionRoot, LEGACY_EXPENSES_PROJECT_ID, resolve_collection_root};
pub use store::{DocumentStore, MemoryStore};
pub use tracker::Tracker;
