use std::collections::HashMap;

use mongodb::{
    bson::{doc, Document},
    results::InsertOneResult,
};
use rocket::futures::TryStreamExt;

use crate::{
    error::{Error, Result},
    model::{
        api::auth::Caller,
        db::{candidate::Candidate, election::Election},
        mongodb::{Coll, Id},
    },
    protocol::parse_id,
};

/// Look up an election by a client-supplied ID.
pub async fn election_by_id(elections: &Coll<Election>, election_id: &str) -> Result<Election> {
    let id = parse_id("election", election_id)?;
    elections
        .find_one(id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::NotFound(format!("election {id}")))
}

/// Look up an election the caller administers.
pub async fn administered_election(
    elections: &Coll<Election>,
    election_id: &str,
    caller: &Caller,
) -> Result<Election> {
    let election = election_by_id(elections, election_id).await?;
    if !caller.administers(election.rt_id) {
        return Err(Error::Forbidden(format!(
            "election {} belongs to another RT",
            election.id
        )));
    }
    Ok(election)
}

/// The ID the database assigned to a freshly inserted document.
pub fn inserted_id(result: &InsertOneResult) -> Result<Id> {
    result
        .inserted_id
        .as_object_id()
        .map(Id::from)
        .ok_or_else(|| Error::Integrity(format!("inserted ID {} is not an ObjectId", result.inserted_id)))
}

/// Look up a candidate of the given election by a client-supplied ID.
pub async fn candidate_in(
    candidates: &Coll<Candidate>,
    election_id: Id,
    candidate_id: &str,
) -> Result<Candidate> {
    let id = parse_id("candidate", candidate_id)?;
    let filter = doc! {
        "_id": id,
        "election_id": election_id,
    };
    candidates
        .find_one(filter, None)
        .await?
        .ok_or_else(|| Error::NotFound(format!("candidate {id} in election {election_id}")))
}

/// Names of the candidates matching `filter`, keyed by hex candidate ID.
pub async fn candidate_names(
    candidates: &Coll<Candidate>,
    filter: Document,
) -> Result<HashMap<String, String>> {
    let candidates: Vec<Candidate> = candidates
        .find(filter, None)
        .await?
        .try_collect()
        .await?;
    Ok(candidates
        .into_iter()
        .map(|c| (c.id.to_string(), c.candidate.name))
        .collect())
}
