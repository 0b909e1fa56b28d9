use mongodb::{bson::doc, options::FindOptions};
use rocket::{futures::TryStreamExt, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::{Admin, AuthToken},
            candidate::{CandidateDescription, CandidateSpec, CandidateUpdate},
            election::{
                Dashboard, ElectionDescription, ElectionSpec, ElectionSummary, FinalizeOutcome,
                StatusUpdate,
            },
        },
        common::election::ElectionStatus,
        db::{
            candidate::{Candidate, NewCandidate},
            election::{Election, NewElection},
        },
        mongodb::Coll,
    },
    protocol::Finalizer,
};

use super::common::{administered_election, candidate_in, inserted_id};

/// How many elections the dashboard lists.
const RECENT_ELECTIONS: i64 = 3;

pub fn routes() -> Vec<Route> {
    routes![
        dashboard,
        create_election,
        update_status,
        add_candidate,
        update_candidate,
        delete_candidate,
        finalize,
        reset_finalize,
    ]
}

#[get("/admin/dashboard")]
pub async fn dashboard(token: AuthToken<Admin>, elections: Coll<Election>) -> Result<Json<Dashboard>> {
    let in_status = |status: ElectionStatus| doc! { "rt_id": token.rt_id, "status": status };

    let total_elections = elections
        .count_documents(doc! { "rt_id": token.rt_id }, None)
        .await?;
    let active_elections = elections
        .count_documents(in_status(ElectionStatus::Active), None)
        .await?;
    // A successful finalize moves the election on to `finalized`.
    let awaiting_finalize = elections
        .count_documents(in_status(ElectionStatus::Ended), None)
        .await?;

    let newest_first = FindOptions::builder()
        .sort(doc! { "created_at": -1 })
        .limit(RECENT_ELECTIONS)
        .build();
    let recent: Vec<Election> = elections
        .find(doc! { "rt_id": token.rt_id }, newest_first)
        .await?
        .try_collect()
        .await?;

    Ok(Json(Dashboard {
        total_elections,
        active_elections,
        awaiting_finalize,
        recent: recent.iter().map(ElectionSummary::from).collect(),
    }))
}

#[post("/admin/elections", data = "<spec>", format = "json")]
pub async fn create_election(
    token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    new_elections: Coll<NewElection>,
) -> Result<Json<ElectionDescription>> {
    // Create and insert the election, in the admin's own RT.
    let election = spec.0.into_election(token.rt_id, token.id)?;
    let id = inserted_id(&new_elections.insert_one(&election, None).await?)?;
    info!("Admin {} created election {id} in RT {}", token.id, token.rt_id);

    let election = Election { id, election };
    Ok(Json(ElectionDescription::new(&election, None)))
}

#[put("/admin/elections/<election_id>/status", data = "<update>", format = "json")]
pub async fn update_status(
    token: AuthToken<Admin>,
    election_id: &str,
    update: Json<StatusUpdate>,
    elections: Coll<Election>,
) -> Result<Json<ElectionSummary>> {
    let mut election = administered_election(&elections, election_id, &token.caller()).await?;

    // Only one step forward at a time; finalization has its own endpoint.
    if election.status.next_manual() != Some(update.status) {
        return Err(Error::InvalidState(format!(
            "cannot move election from {} to {}",
            election.status, update.status
        )));
    }

    // Only apply if nobody else moved it in the meantime.
    let filter = doc! {
        "_id": election.id,
        "status": election.status,
    };
    let result = elections
        .update_one(filter, doc! { "$set": { "status": update.status } }, None)
        .await?;
    if result.matched_count == 0 {
        return Err(Error::InvalidState(
            "election status changed concurrently".to_string(),
        ));
    }
    info!(
        "Election {} moved from {} to {}",
        election.id, election.status, update.status
    );

    election.status = update.status;
    Ok(Json((&election).into()))
}

#[post("/admin/elections/<election_id>/candidates", data = "<spec>", format = "json")]
pub async fn add_candidate(
    token: AuthToken<Admin>,
    election_id: &str,
    spec: Json<CandidateSpec>,
    elections: Coll<Election>,
    new_candidates: Coll<NewCandidate>,
) -> Result<Json<CandidateDescription>> {
    let election = administered_election(&elections, election_id, &token.caller()).await?;
    ensure_candidates_editable(&election)?;

    let candidate = spec.0.into_candidate(&election)?;
    let id = inserted_id(&new_candidates.insert_one(&candidate, None).await?)?;
    debug!("Added candidate {id} to election {}", election.id);

    Ok(Json(Candidate { id, candidate }.into()))
}

#[put(
    "/admin/elections/<election_id>/candidates/<candidate_id>",
    data = "<update>",
    format = "json"
)]
pub async fn update_candidate(
    token: AuthToken<Admin>,
    election_id: &str,
    candidate_id: &str,
    update: Json<CandidateUpdate>,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<Json<CandidateDescription>> {
    let election = administered_election(&elections, election_id, &token.caller()).await?;
    ensure_candidates_editable(&election)?;
    let mut candidate = candidate_in(&candidates, election.id, candidate_id).await?;

    update.0.apply(&mut candidate.candidate)?;
    let changes = doc! {
        "$set": {
            "name": &candidate.name,
            "description": candidate.description.clone(),
        },
    };
    candidates
        .update_one(candidate.id.as_doc(), changes, None)
        .await?;
    debug!("Updated candidate {} of election {}", candidate.id, election.id);

    Ok(Json(candidate.into()))
}

#[delete("/admin/elections/<election_id>/candidates/<candidate_id>")]
pub async fn delete_candidate(
    token: AuthToken<Admin>,
    election_id: &str,
    candidate_id: &str,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
) -> Result<()> {
    let election = administered_election(&elections, election_id, &token.caller()).await?;
    ensure_candidates_editable(&election)?;
    let candidate = candidate_in(&candidates, election.id, candidate_id).await?;

    candidates.delete_one(candidate.id.as_doc(), None).await?;
    info!(
        "Admin {} removed candidate {} from election {}",
        token.id, candidate.id, election.id
    );
    Ok(())
}

/// Candidates can change only until voting closes; a sealed tally refers to them.
fn ensure_candidates_editable(election: &Election) -> Result<()> {
    if matches!(
        election.status,
        ElectionStatus::Upcoming | ElectionStatus::Active
    ) {
        Ok(())
    } else {
        Err(Error::InvalidState(format!(
            "cannot change the candidates of an election that is {}",
            election.status
        )))
    }
}

#[post("/admin/elections/<election_id>/finalize")]
pub async fn finalize(
    token: AuthToken<Admin>,
    election_id: &str,
    finalizer: &State<Finalizer>,
) -> Result<Json<FinalizeOutcome>> {
    let finalizer = finalizer.inner().clone();
    let caller = token.caller();
    let election_id = election_id.to_string();

    // Detach from the request, so a dropped connection cannot abandon an
    // election it has already claimed.
    let task = rocket::tokio::spawn(async move { finalizer.finalize(&election_id, &caller).await });
    let receipt = task.await??;
    Ok(Json(receipt.into()))
}

#[post("/admin/elections/<election_id>/finalize/reset")]
pub async fn reset_finalize(
    token: AuthToken<Admin>,
    election_id: &str,
    finalizer: &State<Finalizer>,
) -> Result<()> {
    finalizer.reset(election_id, &token.caller()).await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{json, serde_json},
    };

    use crate::{
        anchor::mock::MockAnchor,
        model::{
            api::{auth::Credentials, election::ElectionRecord},
            common::election::FinalizeStatus,
            db::user::{examples::example_rt, NewUser},
            mongodb::Id,
        },
        protocol::{hasher::commitment_hash, verify::Verification},
    };

    use super::*;

    async fn create(client: &Client) -> ElectionDescription {
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(json!(ElectionSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        serde_json::from_str(&response.into_string().await.unwrap()).unwrap()
    }

    async fn set_status(client: &Client, election: &str, status: ElectionStatus) -> Status {
        client
            .put(uri!(update_status(election)))
            .header(ContentType::JSON)
            .body(json!({ "status": status }).to_string())
            .dispatch()
            .await
            .status()
    }

    async fn login(client: &Client, credentials: Credentials) {
        let response = client
            .post(uri!(crate::api::auth::login))
            .header(ContentType::JSON)
            .body(json!(credentials).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test(admin)]
    #[ignore = "requires a running MongoDB instance"]
    async fn lifecycle_moves_one_step_at_a_time(client: Client) {
        let election = create(&client).await;
        let id = election.summary.id.to_string();
        assert_eq!(election.summary.status, ElectionStatus::Upcoming);
        assert_eq!(election.summary.finalize_status, Some(FinalizeStatus::Pending));

        // No skipping ahead, and no manual finalization.
        assert_eq!(
            set_status(&client, &id, ElectionStatus::Ended).await,
            Status::Conflict
        );
        assert_eq!(set_status(&client, &id, ElectionStatus::Active).await, Status::Ok);
        assert_eq!(set_status(&client, &id, ElectionStatus::Ended).await, Status::Ok);
        assert_eq!(
            set_status(&client, &id, ElectionStatus::Finalized).await,
            Status::Conflict
        );
        // No going back either.
        assert_eq!(
            set_status(&client, &id, ElectionStatus::Active).await,
            Status::Conflict
        );
    }

    #[backend_test(admin)]
    #[ignore = "requires a running MongoDB instance"]
    async fn other_rts_are_off_limits(client: Client, elections: Coll<Election>) {
        let foreign = Election::example(Id::new(), ElectionStatus::Ended);
        elections.insert_one(&foreign, None).await.unwrap();
        let id = foreign.id.to_string();

        assert_eq!(
            set_status(&client, &id, ElectionStatus::Active).await,
            Status::Forbidden
        );
        let response = client.post(uri!(finalize(id.as_str()))).dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(admin)]
    #[ignore = "requires a running MongoDB instance"]
    async fn candidates_can_be_edited_until_voting_closes(
        client: Client,
        elections: Coll<Election>,
        new_candidates: Coll<NewCandidate>,
    ) {
        let election = create(&client).await;
        let id = election.summary.id.to_string();
        let response = client
            .post(uri!(add_candidate(id.as_str())))
            .header(ContentType::JSON)
            .body(json!({ "name": "Bu Siti" }).to_string())
            .dispatch()
            .await;
        let added: CandidateDescription =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let candidate_id = added.id.to_string();

        let response = client
            .put(uri!(update_candidate(id.as_str(), candidate_id.as_str())))
            .header(ContentType::JSON)
            .body(json!({ "description": "Ketua RT 2020-2025" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let updated: CandidateDescription =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(updated.name, "Bu Siti");
        assert_eq!(updated.description.as_deref(), Some("Ketua RT 2020-2025"));

        let response = client
            .delete(uri!(delete_candidate(id.as_str(), candidate_id.as_str())))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let response = client
            .get(uri!(crate::api::public::candidate(id.as_str(), candidate_id.as_str())))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());

        // Once the tally is sealed its candidates are fixed.
        let finalized = Election::example(example_rt(), ElectionStatus::Finalized);
        elections.insert_one(&finalized, None).await.unwrap();
        let sealed_id: Id = new_candidates
            .insert_one(
                NewCandidate {
                    election_id: finalized.id,
                    rt_id: finalized.rt_id,
                    name: "Pak Ahmad".to_string(),
                    description: None,
                },
                None,
            )
            .await
            .unwrap()
            .inserted_id
            .as_object_id()
            .unwrap()
            .into();
        let (id, candidate_id) = (finalized.id.to_string(), sealed_id.to_string());
        let response = client
            .put(uri!(update_candidate(id.as_str(), candidate_id.as_str())))
            .header(ContentType::JSON)
            .body(json!({ "name": "Pak Ahmad S." }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
        let response = client
            .delete(uri!(delete_candidate(id.as_str(), candidate_id.as_str())))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
        assert_eq!(
            new_candidates
                .count_documents(doc! { "election_id": finalized.id }, None)
                .await
                .unwrap(),
            1
        );
    }

    #[backend_test(admin)]
    #[ignore = "requires a running MongoDB instance"]
    async fn election_end_to_end(client: Client, users: Coll<NewUser>, anchor: MockAnchor) {
        users.insert_one(NewUser::example_voter(), None).await.unwrap();

        // The admin sets up an election with two candidates.
        let election = create(&client).await;
        let id = election.summary.id.to_string();
        let mut candidates = Vec::new();
        for name in ["Bu Siti", "Pak Ahmad"] {
            let response = client
                .post(uri!(add_candidate(id.as_str())))
                .header(ContentType::JSON)
                .body(json!({ "name": name }).to_string())
                .dispatch()
                .await;
            assert_eq!(Status::Ok, response.status());
            let candidate: CandidateDescription =
                serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
            candidates.push(candidate.id.to_string());
        }
        assert_eq!(set_status(&client, &id, ElectionStatus::Active).await, Status::Ok);

        // Finalizing too early is refused.
        let response = client.post(uri!(finalize(id.as_str()))).dispatch().await;
        assert_eq!(Status::Conflict, response.status());

        // A voter commits and reveals.
        login(&client, Credentials::example_voter()).await;
        let response = client
            .post(uri!(crate::api::voter::commit))
            .header(ContentType::JSON)
            .body(
                json!({
                    "election_id": &id,
                    "commitment_hash": commitment_hash(&candidates[1], "nonce123"),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let response = client
            .post(uri!(crate::api::voter::reveal))
            .header(ContentType::JSON)
            .body(
                json!({
                    "election_id": &id,
                    "candidate_id": &candidates[1],
                    "nonce": "nonce123",
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // The admin closes and finalizes.
        login(&client, Credentials::example_admin()).await;
        assert_eq!(set_status(&client, &id, ElectionStatus::Ended).await, Status::Ok);
        let response = client.post(uri!(finalize(id.as_str()))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let outcome: FinalizeOutcome =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let summary = outcome.summary.clone().unwrap();
        assert_eq!(summary.total_revealed, 1);
        assert_eq!(summary.winner, candidates[1]);
        assert_eq!(anchor.recorded(&id), Some(outcome.fingerprint.clone()));

        // Finalizing again changes nothing.
        let response = client.post(uri!(finalize(id.as_str()))).dispatch().await;
        let again: FinalizeOutcome =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(again, outcome);
        assert_eq!(anchor.stores(), 1);

        // Anyone can see the named results and verify them.
        let response = client
            .get(uri!(crate::api::public::election(id.as_str())))
            .dispatch()
            .await;
        let detail: ElectionDescription =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(detail.summary.status, ElectionStatus::Finalized);
        assert_eq!(detail.results.unwrap().winner_name, "Pak Ahmad");

        let response = client
            .get(uri!(crate::api::public::verify(id.as_str())))
            .dispatch()
            .await;
        let verification: Verification =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert!(verification.valid, "{}", verification.message);

        let response = client
            .get(uri!(crate::api::public::record(id.as_str())))
            .dispatch()
            .await;
        let record: ElectionRecord =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(record.summary_fingerprint, Some(outcome.fingerprint));
        assert!(record.finalized_at.unwrap() <= Utc::now());

        // Dashboard counts.
        let response = client.get(uri!(dashboard)).dispatch().await;
        let dashboard: Dashboard =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(dashboard.total_elections, 1);
        assert_eq!(dashboard.awaiting_finalize, 0);
        assert_eq!(dashboard.recent.len(), 1);
    }

    #[backend_test(admin)]
    #[ignore = "requires a running MongoDB instance"]
    async fn failed_anchor_can_be_retried(client: Client, elections: Coll<Election>, anchor: MockAnchor) {
        let election = Election::example(example_rt(), ElectionStatus::Ended);
        elections.insert_one(&election, None).await.unwrap();
        let id = election.id.to_string();

        anchor.fail_stores(true);
        let response = client.post(uri!(finalize(id.as_str()))).dispatch().await;
        assert_eq!(Status::BadGateway, response.status());
        let stored = elections
            .find_one(election.id.as_doc(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.finalize_status, Some(FinalizeStatus::Failed));

        // Nothing is stuck, so there is nothing to reset.
        let response = client.post(uri!(reset_finalize(id.as_str()))).dispatch().await;
        assert_eq!(Status::Conflict, response.status());

        anchor.fail_stores(false);
        let response = client.post(uri!(finalize(id.as_str()))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
    }
}
