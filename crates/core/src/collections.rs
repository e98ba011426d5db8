//! The closed set of collection NSIDs the vault accepts.

pub const FEED_POST: &str = "com.registryaccord.feed.post";
pub const PROFILE: &str = "com.registryaccord.profile";
pub const GRAPH_FOLLOW: &str = "com.registryaccord.graph.follow";
pub const FEED_LIKE: &str = "com.registryaccord.feed.like";
pub const FEED_COMMENT: &str = "com.registryaccord.feed.comment";
pub const FEED_REPOST: &str = "com.registryaccord.feed.repost";
pub const MODERATION_FLAG: &str = "com.registryaccord.moderation.flag";
pub const MEDIA_ASSET: &str = "com.registryaccord.media.asset";

pub const ALL: [&str; 8] = [
    FEED_POST,
    PROFILE,
    GRAPH_FOLLOW,
    FEED_LIKE,
    FEED_COMMENT,
    FEED_REPOST,
    MODERATION_FLAG,
    MEDIA_ASSET,
];

pub fn is_supported(collection: &str) -> bool {
    ALL.contains(&collection)
}
