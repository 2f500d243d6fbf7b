//! The default `AdminNotifier`: logs the reminder. A real chat surface
//! (out of scope here) would swap this for one that actually messages
//! the admins named in `chat.admin_ids`.

use async_trait::async_trait;
use wager_engine::AdminNotifier;
use wager_types::Fight;

pub struct LoggingAdminNotifier;

#[async_trait]
impl AdminNotifier for LoggingAdminNotifier {
    async fn notify_result_needed(&self, admin_external_id: &str, fights: &[Fight]) {
        for fight in fights {
            tracing::warn!(
                admin = admin_external_id,
                fight_id = fight.id.as_i64(),
                title = %fight.title,
                "fight awaiting result"
            );
        }
    }
}
