use mongodb::{bson::doc, options::FindOptions};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::Result,
    model::{
        api::{
            candidate::CandidateDescription,
            election::{ElectionDescription, ElectionRecord, ElectionResults, ElectionSummary},
        },
        common::election::ElectionStatus,
        db::{candidate::Candidate, election::Election},
        mongodb::Coll,
    },
    protocol::{
        hasher::TallySummary,
        parse_id,
        verify::{Verification, Verifier},
    },
};

use super::common::{candidate_in, candidate_names, election_by_id};

pub fn routes() -> Vec<Route> {
    routes![list_elections, election, candidates, candidate, verify, record]
}

#[get("/elections?<rt>")]
pub async fn list_elections(rt: &str, elections: Coll<Election>) -> Result<Json<Vec<ElectionSummary>>> {
    let rt_id = parse_id("RT", rt)?;
    let newest_first = FindOptions::builder()
        .sort(doc! { "start_at": -1 })
        .build();
    let elections: Vec<Election> = elections
        .find(doc! { "rt_id": rt_id }, newest_first)
        .await?
        .try_collect()
        .await?;
    Ok(Json(elections.iter().map(ElectionSummary::from).collect()))
}

#[get("/elections/<election_id>")]
pub async fn election(
    election_id: &str,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<ElectionDescription>> {
    let election = election_by_id(&elections, election_id).await?;

    // Results are public once anchored.
    let results = match (election.status, election.summary.as_deref()) {
        (ElectionStatus::Finalized, Some(summary)) => match TallySummary::parse(summary) {
            Ok(summary) => {
                let names =
                    candidate_names(&candidates, doc! { "election_id": election.id }).await?;
                Some(ElectionResults::new(summary, &names))
            }
            Err(e) => {
                warn!("Stored summary of election {} does not parse: {e}", election.id);
                None
            }
        },
        _ => None,
    };

    Ok(Json(ElectionDescription::new(&election, results)))
}

#[get("/elections/<election_id>/candidates")]
pub async fn candidates(
    election_id: &str,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let election = election_by_id(&elections, election_id).await?;
    let in_order_added = FindOptions::builder().sort(doc! { "_id": 1 }).build();
    let candidates: Vec<Candidate> = candidates
        .find(doc! { "election_id": election.id }, in_order_added)
        .await?
        .try_collect()
        .await?;
    Ok(Json(candidates.into_iter().map(Into::into).collect()))
}

#[get("/elections/<election_id>/candidates/<candidate_id>")]
pub async fn candidate(
    election_id: &str,
    candidate_id: &str,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<CandidateDescription>> {
    let election = election_by_id(&elections, election_id).await?;
    let candidate = candidate_in(&candidates, election.id, candidate_id).await?;
    Ok(Json(candidate.into()))
}

#[get("/elections/<election_id>/verify")]
pub async fn verify(election_id: &str, verifier: &State<Verifier>) -> Result<Json<Verification>> {
    Ok(Json(verifier.verify(election_id).await?))
}

#[get("/elections/<election_id>/record")]
pub async fn record(election_id: &str, elections: Coll<Election>) -> Result<Json<ElectionRecord>> {
    let election = election_by_id(&elections, election_id).await?;
    Ok(Json((&election).into()))
}
