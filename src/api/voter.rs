use std::collections::HashMap;

use mongodb::{bson::doc, options::FindOptions};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::Result,
    model::{
        api::{
            auth::{AuthToken, Voter},
            vote::{CommitRequest, RevealRequest, VoteHistoryEntry, VoterElection},
        },
        db::{candidate::Candidate, election::Election, vote::Vote},
        mongodb::{Coll, Id},
    },
    protocol::CommitReveal,
};

use super::common::candidate_names;

pub fn routes() -> Vec<Route> {
    routes![election_status, commit, reveal, history]
}

#[get("/voter/election")]
pub async fn election_status(
    token: AuthToken<Voter>,
    voting: &State<CommitReveal>,
) -> Result<Json<VoterElection>> {
    let status = voting.status(token.rt_id, token.id).await?;
    Ok(Json(status.into()))
}

#[post("/voter/votes/commit", data = "<request>", format = "json")]
pub async fn commit(
    token: AuthToken<Voter>,
    request: Json<CommitRequest>,
    voting: &State<CommitReveal>,
) -> Result<()> {
    voting
        .commit(token.id, &request.election_id, &request.commitment_hash)
        .await
}

#[post("/voter/votes/reveal", data = "<request>", format = "json")]
pub async fn reveal(
    token: AuthToken<Voter>,
    request: Json<RevealRequest>,
    voting: &State<CommitReveal>,
) -> Result<()> {
    voting
        .reveal(
            token.id,
            &request.election_id,
            &request.candidate_id,
            &request.nonce,
        )
        .await
}

#[get("/voter/votes")]
pub async fn history(
    token: AuthToken<Voter>,
    votes: Coll<Vote>,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<VoteHistoryEntry>>> {
    // Get the voter's votes, newest first.
    let newest_first = FindOptions::builder()
        .sort(doc! { "committed_at": -1 })
        .build();
    let votes: Vec<Vote> = votes
        .find(doc! { "voter_id": token.id }, newest_first)
        .await?
        .try_collect()
        .await?;

    // Get the elections they were cast in.
    let election_ids: Vec<Id> = votes.iter().map(|vote| vote.election_id).collect();
    let elections: HashMap<Id, Election> = elections
        .find(doc! { "_id": { "$in": election_ids } }, None)
        .await?
        .map_ok(|election| (election.id, election))
        .try_collect()
        .await?;

    // And the candidates they chose.
    let chosen: Vec<Id> = votes
        .iter()
        .filter_map(|vote| vote.revealed_candidate_id)
        .collect();
    let names = candidate_names(&candidates, doc! { "_id": { "$in": chosen } }).await?;

    let entries = votes
        .iter()
        .map(|vote| VoteHistoryEntry::new(vote, elections.get(&vote.election_id), &names))
        .collect();
    Ok(Json(entries))
}
