//! Swap request operations: permission checks, the transition table, and the
//! side effects each transition triggers.
//!
//! Storage is the only fatal dependency. Notifications and mailing-list moves
//! run after the row is committed and their failures are logged, never
//! returned.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use slotswap_db::Database;
use slotswap_db::models::{InsertSwapOutcome, NewSwapRequest, StatusPatch, TransitionOutcome};
use slotswap_gateway::{Dispatcher, Notifier};
use slotswap_types::api::{BookView, CompatibilityIndicators, CreateSwapRequest, PartyView, SwapView};
use slotswap_types::events::DomainEvent;
use slotswap_types::models::{Badge, Book, NewsletterSlot, Placement, Profile, SwapRequest, SwapStatus, UserId};

use crate::error::SwapError;
use crate::lifecycle::{InvalidTransition, SwapAction, next_status};
use crate::mailing::{ContactGroup, MailingListGateway};
use crate::reputation;

pub const MAX_SWAP_MESSAGE_LEN: usize = 250;
pub const DEFAULT_MAX_PARTNERS: i64 = 5;
pub const CANCELLED_BY_REQUESTER: &str = "cancelled by requester";

const ALREADY_REQUESTED: &str = "You have already requested a swap for this slot";

/// Guards that are deployment choices rather than lifecycle rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPolicy {
    pub forbid_self_swap: bool,
    pub require_book: bool,
}

impl Default for SwapPolicy {
    fn default() -> Self {
        Self {
            forbid_self_swap: true,
            require_book: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapListDirection {
    /// Requests the user made.
    Sent,
    /// Requests on the user's slots.
    Received,
}

#[derive(Clone)]
pub struct SwapService {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    notifier: Notifier,
    mailing: MailingListGateway,
    policy: SwapPolicy,
}

/// Normalized create input, whichever mode it came from.
struct CreateInput {
    slot_id: i64,
    book_id: Option<i64>,
    offered_slot_id: Option<i64>,
    requested_book_id: Option<i64>,
    message: Option<String>,
    preferred_placement: Placement,
    max_partners_acknowledged: i64,
}

impl From<CreateSwapRequest> for CreateInput {
    fn from(req: CreateSwapRequest) -> Self {
        match req {
            CreateSwapRequest::OneWay {
                slot_id,
                book_id,
                message,
                preferred_placement,
                max_partners_acknowledged,
            } => Self {
                slot_id,
                book_id,
                offered_slot_id: None,
                requested_book_id: None,
                message,
                preferred_placement: preferred_placement.unwrap_or_default(),
                max_partners_acknowledged: max_partners_acknowledged.unwrap_or(DEFAULT_MAX_PARTNERS),
            },
            CreateSwapRequest::Reciprocal {
                slot_id,
                book_id,
                offered_slot_id,
                requested_book_id,
                message,
                preferred_placement,
                max_partners_acknowledged,
            } => Self {
                slot_id,
                book_id,
                offered_slot_id: Some(offered_slot_id),
                requested_book_id,
                message,
                preferred_placement: preferred_placement.unwrap_or_default(),
                max_partners_acknowledged: max_partners_acknowledged.unwrap_or(DEFAULT_MAX_PARTNERS),
            },
        }
    }
}

fn swap_url(id: i64) -> String {
    format!("/dashboard/swaps/{}/", id)
}

fn conflict(err: InvalidTransition) -> SwapError {
    SwapError::Conflict(err.to_string())
}

impl SwapService {
    pub fn new(
        db: Arc<Database>,
        dispatcher: Dispatcher,
        notifier: Notifier,
        mailing: MailingListGateway,
        policy: SwapPolicy,
    ) -> Self {
        Self {
            db,
            dispatcher,
            notifier,
            mailing,
            policy,
        }
    }

    // -- Operations --

    pub async fn create(&self, requester_id: UserId, req: CreateSwapRequest) -> Result<SwapView, SwapError> {
        let input = CreateInput::from(req);

        let slot = self
            .db
            .get_slot(input.slot_id)?
            .ok_or_else(|| SwapError::NotFound(format!("Slot {} not found", input.slot_id)))?;
        if self.policy.forbid_self_swap && slot.owner_id == requester_id {
            return Err(SwapError::Validation(
                "You cannot request a swap on your own slot".into(),
            ));
        }

        let message = input
            .message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        if message
            .as_ref()
            .is_some_and(|m| m.chars().count() > MAX_SWAP_MESSAGE_LEN)
        {
            return Err(SwapError::Validation(format!(
                "Message must be at most {} characters",
                MAX_SWAP_MESSAGE_LEN
            )));
        }
        if input.max_partners_acknowledged < 1 {
            return Err(SwapError::Validation(
                "max_partners_acknowledged must be at least 1".into(),
            ));
        }

        if let Some(offered_slot_id) = input.offered_slot_id {
            let owned = self
                .db
                .get_slot(offered_slot_id)?
                .is_some_and(|s| s.owner_id == requester_id);
            if !owned {
                return Err(SwapError::Validation(
                    "Offered slot must be one of your own slots".into(),
                ));
            }
        }
        if let Some(requested_book_id) = input.requested_book_id {
            let owned = self
                .db
                .get_book(requested_book_id)?
                .is_some_and(|b| b.owner_id == slot.owner_id);
            if !owned {
                return Err(SwapError::Validation(
                    "Requested book must belong to the slot owner".into(),
                ));
            }
        }

        let book = self.resolve_book(requester_id, input.book_id)?;
        if book.is_none() && self.policy.require_book {
            return Err(SwapError::Validation("A promotional book is required".into()));
        }

        let owner_profile = self.db.get_profile(slot.owner_id)?;
        let requester_profile = self.db.get_profile(requester_id)?;
        let are_friends = self.db.are_friends(slot.owner_id, requester_id)?;
        let verdict = reputation::evaluate(owner_profile.as_ref(), requester_profile.as_ref(), are_friends);
        let status = if verdict.auto_confirm {
            SwapStatus::Confirmed
        } else {
            SwapStatus::Pending
        };

        let requester_email = self.contact_email(requester_id)?;
        let ctx = self.context_for(
            slot.clone(),
            requester_id,
            book.clone(),
            owner_profile.as_ref(),
            requester_profile.as_ref(),
        )?;

        let new = NewSwapRequest {
            slot_id: slot.id,
            requester_id,
            book_id: book.as_ref().map(|b| b.id),
            offered_slot_id: input.offered_slot_id,
            requested_book_id: input.requested_book_id,
            status,
            message,
            preferred_placement: input.preferred_placement,
            max_partners_acknowledged: input.max_partners_acknowledged,
        };
        let swap = match self.db.insert_swap_request(&new)? {
            InsertSwapOutcome::Created(swap) => swap,
            InsertSwapOutcome::Duplicate(existing) => {
                return Err(SwapError::Conflict(format!(
                    "{} (current status: '{}')",
                    ALREADY_REQUESTED, existing
                )));
            }
        };

        let view = ctx.render(&swap);
        info!(
            "Swap {} created by user {} on slot {} ({})",
            swap.id, requester_id, slot.id, status
        );

        if verdict.auto_confirm {
            self.notify(
                requester_id,
                "Swap Confirmed",
                &format!("{} auto-approved your swap request", view.owner.name),
                Badge::Swap,
                swap.id,
            )
            .await;
            self.move_requester(
                requester_email.as_deref(),
                Some(ContactGroup::Pending),
                ContactGroup::Approved,
            );
        } else {
            self.notify(
                slot.owner_id,
                "New Swap Request",
                &format!(
                    "{} requested a swap for your {} newsletter",
                    view.requester.name, slot.send_date
                ),
                Badge::Swap,
                swap.id,
            )
            .await;
            self.move_requester(requester_email.as_deref(), None, ContactGroup::Pending);
        }

        self.dispatcher.publish(DomainEvent::SwapCreated(view.clone()));
        Ok(view)
    }

    pub async fn accept(&self, actor_id: UserId, id: i64) -> Result<SwapView, SwapError> {
        let (swap, slot) = self.load(id)?;
        if actor_id != slot.owner_id {
            return Err(SwapError::Permission(
                "Only the slot owner can accept this request".into(),
            ));
        }
        let action = SwapAction::Accept;
        let to = next_status(swap.status, action).map_err(conflict)?;
        let requester_email = self.contact_email(swap.requester_id)?;
        let ctx = self.context(&swap, slot)?;

        let updated = self.apply(&swap, action, &StatusPatch::to(to))?;
        let view = ctx.render(&updated);
        info!("Swap {} accepted by user {}", id, actor_id);

        self.notify(
            swap.requester_id,
            "Swap Accepted",
            &format!("{} accepted your swap request", view.owner.name),
            Badge::Swap,
            id,
        )
        .await;
        self.move_requester(
            requester_email.as_deref(),
            Some(ContactGroup::Pending),
            ContactGroup::Approved,
        );

        self.dispatcher.publish(DomainEvent::SwapAccepted(view.clone()));
        Ok(view)
    }

    pub async fn reject(&self, actor_id: UserId, id: i64, reason: Option<String>) -> Result<SwapView, SwapError> {
        let (swap, slot) = self.load(id)?;
        if actor_id != slot.owner_id {
            return Err(SwapError::Permission(
                "Only the slot owner can reject this request".into(),
            ));
        }
        let action = SwapAction::Reject;
        let to = next_status(swap.status, action).map_err(conflict)?;
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        let requester_email = self.contact_email(swap.requester_id)?;
        let ctx = self.context(&swap, slot)?;

        let patch = StatusPatch {
            rejection_reason: reason.clone(),
            rejected_at: Some(Utc::now()),
            ..StatusPatch::to(to)
        };
        let updated = self.apply(&swap, action, &patch)?;
        let view = ctx.render(&updated);
        info!("Swap {} rejected by user {} (was {})", id, actor_id, swap.status);

        let body = match &reason {
            Some(reason) => format!("{} declined your swap request: {}", view.owner.name, reason),
            None => format!("{} declined your swap request", view.owner.name),
        };
        self.notify(swap.requester_id, "Swap Rejected", &body, Badge::Swap, id)
            .await;

        let from = if swap.status == SwapStatus::Pending {
            ContactGroup::Pending
        } else {
            ContactGroup::Approved
        };
        self.move_requester(requester_email.as_deref(), Some(from), ContactGroup::Rejected);

        self.dispatcher.publish(DomainEvent::SwapRejected(view.clone()));
        Ok(view)
    }

    pub async fn restore(&self, actor_id: UserId, id: i64) -> Result<SwapView, SwapError> {
        let (swap, slot) = self.load(id)?;
        if actor_id != slot.owner_id {
            return Err(SwapError::Permission(
                "Only the slot owner can restore this request".into(),
            ));
        }
        let action = SwapAction::Restore;
        let to = next_status(swap.status, action).map_err(conflict)?;
        let requester_email = self.contact_email(swap.requester_id)?;
        let ctx = self.context(&swap, slot)?;

        let updated = self.apply(&swap, action, &StatusPatch::to(to))?;
        let view = ctx.render(&updated);
        info!("Swap {} restored by user {}", id, actor_id);

        self.notify(
            swap.requester_id,
            "Swap Restored",
            &format!("{} reopened your swap request", view.owner.name),
            Badge::Swap,
            id,
        )
        .await;
        self.move_requester(
            requester_email.as_deref(),
            Some(ContactGroup::Rejected),
            ContactGroup::Pending,
        );

        self.dispatcher.publish(DomainEvent::SwapRestored(view.clone()));
        Ok(view)
    }

    pub async fn cancel(&self, actor_id: UserId, id: i64) -> Result<SwapView, SwapError> {
        let (swap, slot) = self.load(id)?;
        if actor_id != swap.requester_id {
            return Err(SwapError::Permission(
                "Only the requester can cancel this request".into(),
            ));
        }
        let owner_id = slot.owner_id;
        let action = SwapAction::Cancel;
        let to = next_status(swap.status, action).map_err(conflict)?;
        let ctx = self.context(&swap, slot)?;

        let patch = StatusPatch {
            rejection_reason: Some(CANCELLED_BY_REQUESTER.to_string()),
            rejected_at: Some(Utc::now()),
            ..StatusPatch::to(to)
        };
        let updated = self.apply(&swap, action, &patch)?;
        let view = ctx.render(&updated);
        info!("Swap {} cancelled by requester {}", id, actor_id);

        self.notify(
            owner_id,
            "Swap Cancelled",
            &format!("{} cancelled their swap request", view.requester.name),
            Badge::Swap,
            id,
        )
        .await;

        self.dispatcher.publish(DomainEvent::SwapCancelled(view.clone()));
        Ok(view)
    }

    /// Operational progression after confirmation. Not gated on a user.
    pub async fn advance(
        &self,
        id: i64,
        target: SwapStatus,
        scheduled_date: Option<NaiveDate>,
    ) -> Result<SwapView, SwapError> {
        let (swap, slot) = self.load(id)?;
        let owner_id = slot.owner_id;
        let action = SwapAction::Advance(target);
        let to = next_status(swap.status, action).map_err(conflict)?;
        let ctx = self.context(&swap, slot)?;

        let mut patch = StatusPatch::to(to);
        match to {
            SwapStatus::Scheduled => patch.scheduled_date = scheduled_date,
            SwapStatus::Completed => patch.completed_at = Some(Utc::now()),
            _ => {}
        }
        let updated = self.apply(&swap, action, &patch)?;
        let view = ctx.render(&updated);
        info!("Swap {} advanced {} -> {}", id, swap.status, to);

        let (title, body, badge) = match to {
            SwapStatus::Sending => ("Swap Sending", "Your swap is being sent".to_string(), Badge::Swap),
            SwapStatus::Scheduled => (
                "Swap Scheduled",
                match view.scheduled_date {
                    Some(date) => format!("Your swap is scheduled for {}", date),
                    None => "Your swap has been scheduled".to_string(),
                },
                Badge::Reminder,
            ),
            SwapStatus::Completed => ("Swap Completed", "Your swap has been sent".to_string(), Badge::Swap),
            _ => ("Swap Verified", "Your swap has been verified".to_string(), Badge::Verified),
        };
        self.notify(swap.requester_id, title, &body, badge, id).await;
        if to == SwapStatus::Verified {
            self.notify(owner_id, title, &body, badge, id).await;
        }

        self.dispatcher.publish(DomainEvent::SwapAdvanced(view.clone()));
        Ok(view)
    }

    /// Visible to the requester and the slot owner only.
    pub fn get(&self, actor_id: UserId, id: i64) -> Result<SwapView, SwapError> {
        let (swap, slot) = self.load(id)?;
        if actor_id != slot.owner_id && actor_id != swap.requester_id {
            return Err(SwapError::Permission(
                "You are not a party to this swap".into(),
            ));
        }
        Ok(self.context(&swap, slot)?.render(&swap))
    }

    pub fn list(&self, user_id: UserId, direction: SwapListDirection) -> Result<Vec<SwapView>, SwapError> {
        let swaps = match direction {
            SwapListDirection::Sent => self.db.list_sent_swap_requests(user_id)?,
            SwapListDirection::Received => self.db.list_received_swap_requests(user_id)?,
        };
        swaps
            .iter()
            .map(|swap| {
                let slot = self.slot(swap.slot_id)?;
                Ok(self.context(swap, slot)?.render(swap))
            })
            .collect()
    }

    /// Pull the audience size for the user's contact email and copy it onto
    /// their slots when the mailing list knows a positive value.
    pub async fn sync_audience(&self, user_id: UserId) -> Result<u64, SwapError> {
        let email = self
            .contact_email(user_id)?
            .ok_or_else(|| SwapError::Validation("No contact email on file".into()))?;

        let audience = self.mailing.subscriber_count(&email).await;
        if audience > 0 {
            let size = i64::try_from(audience).unwrap_or(i64::MAX);
            let updated = self.db.update_audience_for_owner(user_id, size)?;
            info!("Synced audience {} onto {} slots of user {}", audience, updated, user_id);
        }
        Ok(audience)
    }

    // -- Helpers --
    //
    // Everything that can fail on a read runs before `apply` or the insert.
    // Past the commit only notifications and mailing moves remain, and those
    // log their own failures.

    fn slot(&self, slot_id: i64) -> Result<NewsletterSlot, SwapError> {
        self.db
            .get_slot(slot_id)?
            .ok_or_else(|| SwapError::NotFound(format!("Slot {} not found", slot_id)))
    }

    fn load(&self, id: i64) -> Result<(SwapRequest, NewsletterSlot), SwapError> {
        let swap = self
            .db
            .get_swap_request(id)?
            .ok_or_else(|| SwapError::NotFound(format!("Swap request {} not found", id)))?;
        let slot = self.slot(swap.slot_id)?;
        Ok((swap, slot))
    }

    /// Explicit book must be the requester's; otherwise the primary promo
    /// book, else the most recent active one.
    fn resolve_book(&self, requester_id: UserId, book_id: Option<i64>) -> Result<Option<Book>, SwapError> {
        match book_id {
            Some(book_id) => {
                let book = self
                    .db
                    .get_book(book_id)?
                    .filter(|b| b.owner_id == requester_id)
                    .ok_or_else(|| SwapError::Validation("Book must be one of your own books".into()))?;
                Ok(Some(book))
            }
            None => Ok(self.db.find_promo_book(requester_id)?),
        }
    }

    fn apply(&self, swap: &SwapRequest, action: SwapAction, patch: &StatusPatch) -> Result<SwapRequest, SwapError> {
        match self.db.transition_swap_request(swap.id, swap.status, patch)? {
            TransitionOutcome::Applied(updated) => Ok(updated),
            TransitionOutcome::Stale(found) => Err(conflict(InvalidTransition { action, from: found })),
            TransitionOutcome::Missing => Err(SwapError::NotFound(format!(
                "Swap request {} not found",
                swap.id
            ))),
            TransitionOutcome::Duplicate => Err(SwapError::Conflict(ALREADY_REQUESTED.into())),
        }
    }

    async fn notify(&self, recipient_id: UserId, title: &str, body: &str, badge: Badge, swap_id: i64) {
        let url = swap_url(swap_id);
        if let Err(e) = self
            .notifier
            .notify(recipient_id, title, body, badge, Some(&url))
            .await
        {
            warn!("Failed to notify user {} about swap {}: {}", recipient_id, swap_id, e);
        }
    }

    fn contact_email(&self, user_id: UserId) -> Result<Option<String>, SwapError> {
        let Some(user) = self.db.get_user(user_id)? else {
            return Ok(None);
        };
        let profile = self.db.get_profile(user_id)?;
        Ok(match &profile {
            Some(profile) => profile.contact_email(&user).map(str::to_string),
            None => user.email,
        })
    }

    fn move_requester(&self, email: Option<&str>, from: Option<ContactGroup>, to: ContactGroup) {
        match email {
            Some(email) => {
                self.mailing.move_contact(email, from, to);
            }
            None => debug!("Requester has no contact email, skipping move to {:?}", to),
        }
    }

    fn party(&self, user_id: UserId, profile: Option<&Profile>) -> Result<PartyView, SwapError> {
        Ok(PartyView {
            user_id,
            name: self.db.display_name(user_id)?,
            avatar_url: profile.and_then(|p| p.avatar_url.clone()),
            primary_genre: profile.map(|p| p.primary_genre.clone()).unwrap_or_default(),
        })
    }

    fn context(&self, swap: &SwapRequest, slot: NewsletterSlot) -> Result<ViewContext, SwapError> {
        let owner_profile = self.db.get_profile(slot.owner_id)?;
        let requester_profile = self.db.get_profile(swap.requester_id)?;
        let book = match swap.book_id {
            Some(book_id) => self.db.get_book(book_id)?,
            None => None,
        };
        self.context_for(
            slot,
            swap.requester_id,
            book,
            owner_profile.as_ref(),
            requester_profile.as_ref(),
        )
    }

    fn context_for(
        &self,
        slot: NewsletterSlot,
        requester_id: UserId,
        book: Option<Book>,
        owner_profile: Option<&Profile>,
        requester_profile: Option<&Profile>,
    ) -> Result<ViewContext, SwapError> {
        let compatibility = reputation::compatibility(&slot, book.as_ref(), owner_profile, requester_profile);
        Ok(ViewContext {
            owner: self.party(slot.owner_id, owner_profile)?,
            requester: self.party(requester_id, requester_profile)?,
            slot,
            book,
            compatibility,
        })
    }
}

/// Everything a [`SwapView`] shows besides the swap row itself.
struct ViewContext {
    slot: NewsletterSlot,
    book: Option<Book>,
    owner: PartyView,
    requester: PartyView,
    compatibility: CompatibilityIndicators,
}

impl ViewContext {
    fn render(&self, swap: &SwapRequest) -> SwapView {
        SwapView {
            id: swap.id,
            status: swap.status,
            status_label: swap.status.label().to_string(),
            slot_id: self.slot.id,
            slot_send_date: self.slot.send_date,
            slot_genre: self.slot.preferred_genre.clone(),
            requester: self.requester.clone(),
            owner: self.owner.clone(),
            book: self.book.as_ref().map(|b| BookView {
                id: b.id,
                title: b.title.clone(),
                primary_genre: b.primary_genre.clone(),
            }),
            offered_slot_id: swap.offered_slot_id,
            requested_book_id: swap.requested_book_id,
            message: swap.message.clone(),
            preferred_placement: swap.preferred_placement,
            max_partners_acknowledged: swap.max_partners_acknowledged,
            rejection_reason: swap.rejection_reason.clone(),
            rejected_at: swap.rejected_at,
            scheduled_date: swap.scheduled_date,
            completed_at: swap.completed_at,
            created_at: swap.created_at,
            compatibility: self.compatibility,
        }
    }
}
