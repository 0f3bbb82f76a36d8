//! Reward policy constants.

/// Credit packs earned by the referrer per successful referral.
pub const REFERRER_PACK_REWARD: i32 = 1;

/// Bonus AI credits granted to the referrer for bringing a new account.
pub const REFERRER_BONUS_CREDITS: i64 = 20;

/// Bonus AI credits granted to the referee for using a code.
pub const REFEREE_BONUS_CREDITS: i64 = 10;

/// AI credits granted to every new account at signup.
pub const SIGNUP_GRANT_CREDITS: i64 = 10;
