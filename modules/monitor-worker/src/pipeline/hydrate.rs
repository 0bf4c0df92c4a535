use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use bluesky_client::Post;

use crate::filter::FilterResult;

/// Screening verdict with cid references resolved back to full posts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HydratedResult {
    #[serde(default)]
    pub posts: Vec<Post>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaking: Option<Vec<Post>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Resolve `cids` into `posts` and `breaking` in place, by exact cid match
/// against `posts`. Unmatched cids are dropped.
///
/// `cids` is always consumed. When it is absent, an already hydrated `posts`
/// list carried in the input is kept, and a `breaking` that is not a cid list
/// passes through as is, so hydrating twice changes nothing.
pub fn hydrate(filter: FilterResult, posts: &[Post]) -> HydratedResult {
    let mut by_cid: HashMap<&str, &Post> = HashMap::with_capacity(posts.len());
    for post in posts {
        by_cid.entry(post.cid.as_str()).or_insert(post);
    }

    let resolve = |cids: Vec<String>| -> Vec<Post> {
        let mut found = Vec::with_capacity(cids.len());
        for cid in cids {
            match by_cid.get(cid.as_str()) {
                Some(post) => found.push((*post).clone()),
                None => tracing::debug!(%cid, "Dropping cid with no matching post"),
            }
        }
        found
    };

    let FilterResult {
        cids,
        breaking,
        keywords,
        mut extra,
    } = filter;

    // A malformed cids field was kept in `extra`; it is consumed all the same.
    extra.remove("cids");
    let carried_posts = extra.remove("posts");

    let posts = match cids {
        Some(cids) => resolve(cids),
        None => carried_posts
            .and_then(|value| serde_json::from_value::<Vec<Post>>(value).ok())
            .unwrap_or_default(),
    };

    HydratedResult {
        posts,
        breaking: breaking.map(resolve),
        keywords,
        extra,
    }
}
