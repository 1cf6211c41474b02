use crate::{
    errors::ServiceError,
    services::products::{ProductDto, ProductService},
};
use std::sync::Arc;
use tracing::{debug, instrument};

const RECOMMENDATION_COUNT: u64 = 5;

/// Product suggestions for a signed-in buyer.
///
/// Currently returns the newest visible products for everyone; the user id
/// is accepted so a personalised strategy can replace this without touching
/// callers.
#[derive(Clone)]
pub struct RecommendationService {
    products: Arc<ProductService>,
}

impl RecommendationService {
    pub fn new(products: Arc<ProductService>) -> Self {
        Self { products }
    }

    #[instrument(skip(self))]
    pub async fn for_user(&self, user_id: i32) -> Result<Vec<ProductDto>, ServiceError> {
        let picks = self.products.newest_visible(RECOMMENDATION_COUNT).await?;
        debug!(user_id, count = picks.len(), "Recommendations computed");
        Ok(picks)
    }
}
