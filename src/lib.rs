//! Telegram support desk with AI answers - Library exports for testing
//!
//! (c) Softlandia 2025

pub mod api;
pub mod config;
pub mod core;
pub mod infrastructure;

use crate::api::Uptime;
use crate::config::Settings;
use crate::core::admin::AdminDesk;
use crate::core::assistant::Assistant;
use crate::core::faq_cache::FaqCache;
use crate::core::knowledge::KnowledgeBase;
use crate::core::services::SupportService;
use crate::core::traits::{AiProvider, Notifier};
use crate::infrastructure::store::TicketStore;
use di::{Injectable, Ref, ServiceCollection, singleton_factory};
use std::time::Instant;

/// Registers every component as a process-wide singleton. The provider and
/// notifier come from outside since they wrap network clients.
pub fn services(
    settings: Settings,
    ai: Ref<dyn AiProvider>,
    notifier: Ref<dyn Notifier>,
) -> ServiceCollection {
    let started = Instant::now();
    let settings = Ref::new(settings);

    let mut collection = ServiceCollection::new();
    collection
        .add(singleton_factory(move |_| settings.clone()))
        .add(singleton_factory(move |_| ai.clone()))
        .add(singleton_factory(move |_| notifier.clone()))
        .add(singleton_factory(move |_| Ref::new(Uptime::since(started))))
        .add(TicketStore::singleton())
        .add(FaqCache::singleton())
        .add(KnowledgeBase::singleton())
        .add(Assistant::singleton())
        .add(AdminDesk::singleton())
        .add(SupportService::singleton());
    collection
}
