use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime},
    options::FindOneOptions,
    Database,
};
use rocket::futures::TryStreamExt;

use crate::model::{
    common::election::{ElectionStatus, FinalizeStatus},
    db::{
        election::Election,
        vote::{NewVote, Vote},
    },
    mongodb::{is_duplicate_key_error, Coll, Id},
};

use super::{ElectionRepo, StoreError, StoreResult, VoteLedger};

/// The MongoDB-backed store.
#[derive(Clone)]
pub struct MongoStore {
    elections: Coll<Election>,
    votes: Coll<Vote>,
    new_votes: Coll<NewVote>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            elections: Coll::from_db(db),
            votes: Coll::from_db(db),
            new_votes: Coll::from_db(db),
        }
    }

    /// IDs of every election the voter holds a vote in.
    async fn committed_election_ids(&self, voter_id: Id) -> StoreResult<Vec<Bson>> {
        Ok(self
            .votes
            .distinct("election_id", doc! {"voter_id": voter_id}, None)
            .await?)
    }
}

#[rocket::async_trait]
impl ElectionRepo for MongoStore {
    async fn election(&self, id: Id) -> StoreResult<Option<Election>> {
        Ok(self.elections.find_one(id.as_doc(), None).await?)
    }

    async fn set_finalize_status_if(
        &self,
        id: Id,
        new: FinalizeStatus,
        allowed: &[Option<FinalizeStatus>],
    ) -> StoreResult<u64> {
        // A null in `$in` also matches a missing field.
        let allowed: Vec<Bson> = allowed
            .iter()
            .map(|status| status.map(Bson::from).unwrap_or(Bson::Null))
            .collect();
        let filter = doc! {
            "_id": id,
            "finalize_status": { "$in": allowed },
        };
        let update = doc! {
            "$set": { "finalize_status": new },
        };
        let result = self.elections.update_one(filter, update, None).await?;
        trace!(
            "Finalize status CAS to {new} on election {id}: {} matched",
            result.matched_count
        );
        Ok(result.matched_count)
    }

    async fn set_finalize_failed(&self, id: Id, reason: &str) -> StoreResult<u64> {
        let filter = doc! {
            "_id": id,
            "finalize_status": FinalizeStatus::Finalizing,
        };
        let update = doc! {
            "$set": {
                "finalize_status": FinalizeStatus::Failed,
                "finalize_error": reason,
            },
        };
        let result = self.elections.update_one(filter, update, None).await?;
        Ok(result.matched_count)
    }

    async fn set_summary_and_fingerprint(
        &self,
        id: Id,
        summary: &str,
        fingerprint: &str,
    ) -> StoreResult<()> {
        let update = doc! {
            "$set": {
                "summary": summary,
                "summary_fingerprint": fingerprint,
                "finalize_status": FinalizeStatus::Finalizing,
            },
        };
        self.elections.update_one(id.as_doc(), update, None).await?;
        Ok(())
    }

    async fn set_finalize_result(
        &self,
        id: Id,
        anchor_reference: &str,
        finalized_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let update = doc! {
            "$set": {
                "anchor_reference": anchor_reference,
                "finalized_at": BsonDateTime::from_chrono(finalized_at),
                "finalize_status": FinalizeStatus::Success,
                "finalize_error": Bson::Null,
                "status": ElectionStatus::Finalized,
            },
        };
        self.elections.update_one(id.as_doc(), update, None).await?;
        Ok(())
    }

    async fn open_election_for_voter(
        &self,
        rt_id: Id,
        voter_id: Id,
    ) -> StoreResult<Option<Election>> {
        let committed = self.committed_election_ids(voter_id).await?;
        let filter = doc! {
            "rt_id": rt_id,
            "status": ElectionStatus::Active,
            "_id": { "$nin": committed },
        };
        let options = FindOneOptions::builder()
            .sort(doc! {"start_at": 1})
            .build();
        Ok(self.elections.find_one(filter, options).await?)
    }

    async fn latest_committed_election(
        &self,
        rt_id: Id,
        voter_id: Id,
    ) -> StoreResult<Option<Election>> {
        let committed = self.committed_election_ids(voter_id).await?;
        let filter = doc! {
            "rt_id": rt_id,
            "_id": { "$in": committed },
        };
        let options = FindOneOptions::builder()
            .sort(doc! {"start_at": -1})
            .build();
        Ok(self.elections.find_one(filter, options).await?)
    }
}

#[rocket::async_trait]
impl VoteLedger for MongoStore {
    async fn create_vote(&self, vote: &NewVote) -> StoreResult<()> {
        match self.new_votes.insert_one(vote, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key_error(&e) => Err(StoreError::DuplicateKey),
            Err(e) => Err(e.into()),
        }
    }

    async fn vote(&self, voter_id: Id, election_id: Id) -> StoreResult<Option<Vote>> {
        let filter = doc! {
            "voter_id": voter_id,
            "election_id": election_id,
        };
        Ok(self.votes.find_one(filter, None).await?)
    }

    async fn mark_revealed(
        &self,
        voter_id: Id,
        election_id: Id,
        candidate_id: Id,
        revealed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let filter = doc! {
            "voter_id": voter_id,
            "election_id": election_id,
            "is_revealed": false,
        };
        let update = doc! {
            "$set": {
                "is_revealed": true,
                "revealed_candidate_id": candidate_id,
                "revealed_at": BsonDateTime::from_chrono(revealed_at),
            },
        };
        let result = self.votes.update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn revealed_votes(&self, election_id: Id) -> StoreResult<Vec<Vote>> {
        let filter = doc! {
            "election_id": election_id,
            "is_revealed": true,
        };
        Ok(self.votes.find(filter, None).await?.try_collect().await?)
    }
}
