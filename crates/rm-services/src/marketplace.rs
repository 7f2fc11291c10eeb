//! Marketplace: listings, purchases and the expired-sale sweep.

use std::sync::Arc;

use rm_core::clock::Clock;
use rm_core::error::{MarketError, Result};
use rm_core::models::{
    ListingDraft, ListingPatch, Product, ProductFilter, PurchaseCommit, User, WriteOutcome,
};
use rm_core::traits::{ProductRepo, UserRepo};
use rm_core::validation;
use uuid::Uuid;

use crate::access::{
    is_acting_admin, load_product, load_user, update_product_with, MAX_WRITE_ATTEMPTS,
};
use crate::MarketSettings;

/// Result of a successful purchase.
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    pub product: Product,
    /// Buyer's balance after the debit
    pub balance: u64,
}

pub struct Marketplace {
    users: Arc<dyn UserRepo>,
    products: Arc<dyn ProductRepo>,
    clock: Arc<dyn Clock>,
    settings: MarketSettings,
}

impl Marketplace {
    pub fn new(
        users: Arc<dyn UserRepo>,
        products: Arc<dyn ProductRepo>,
        clock: Arc<dyn Clock>,
        settings: MarketSettings,
    ) -> Self {
        Self {
            users,
            products,
            clock,
            settings,
        }
    }

    /// Moves `price` from buyer to seller and stamps the product, as one
    /// revision-checked commit. Every check is re-run if the commit loses
    /// a race, so a product that sold meanwhile reports `AlreadySold`.
    pub async fn purchase(&self, product_id: Uuid, buyer: &str) -> Result<PurchaseReceipt> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let commit = self.prepare_purchase(product_id, buyer).await?;
            let price = commit.product.price;
            match self.products.commit_purchase(commit).await? {
                WriteOutcome::Applied(done) => {
                    tracing::info!(
                        product_id = %product_id,
                        buyer,
                        seller = %done.seller.username,
                        price,
                        "purchase completed"
                    );
                    return Ok(PurchaseReceipt {
                        product: done.product,
                        balance: done.buyer.balance,
                    });
                }
                WriteOutcome::Conflict | WriteOutcome::Missing => {
                    tracing::debug!(product_id = %product_id, buyer, attempt, "purchase raced, re-checking");
                }
            }
        }
        Err(MarketError::Conflict)
    }

    async fn prepare_purchase(&self, product_id: Uuid, buyer: &str) -> Result<PurchaseCommit> {
        let mut product = load_product(&*self.products, product_id).await?;
        if product.is_sold() {
            return Err(MarketError::AlreadySold);
        }
        if product.is_deleted {
            return Err(MarketError::NotFound("product", product_id.to_string()));
        }
        if product.author == buyer {
            return Err(MarketError::forbidden("you cannot buy your own listing"));
        }

        let mut buyer_row = load_user(&*self.users, buyer).await?;
        if buyer_row.balance < product.price {
            return Err(MarketError::InsufficientBalance {
                needed: product.price,
                available: buyer_row.balance,
            });
        }

        let Some(mut seller) = self.users.get_user(&product.author).await? else {
            tracing::warn!(product_id = %product_id, seller = %product.author, "purchase of orphaned listing refused");
            return Err(MarketError::SellerMissing(product.author.clone()));
        };

        seller.balance = seller
            .balance
            .checked_add(product.price)
            .ok_or_else(|| MarketError::Internal("seller balance overflow".into()))?;
        buyer_row.balance -= product.price;
        product.mark_purchased(buyer, self.clock.now());

        Ok(PurchaseCommit {
            product,
            buyer: buyer_row,
            seller,
        })
    }

    /// Hides sales older than the retention window. Returns how many
    /// products were flipped; a second run right after flips none.
    pub async fn sweep_expired_sales(&self) -> Result<usize> {
        let now = self.clock.now();
        let cutoff = now - self.settings.sale_retention;
        let filter = ProductFilter {
            sold: Some(true),
            ..ProductFilter::listed()
        };

        let mut flipped = 0;
        for product in self.products.list_products(&filter).await? {
            if !product.purchased_at.is_some_and(|at| at < cutoff) {
                continue;
            }
            let mut changed = false;
            update_product_with(&*self.products, product.id, |p| {
                changed = !p.is_deleted;
                p.is_deleted = true;
                Ok(changed)
            })
            .await?;
            if changed {
                flipped += 1;
            }
        }
        if flipped > 0 {
            tracing::info!(flipped, "expired sales hidden");
        }
        Ok(flipped)
    }

    pub async fn create_listing(&self, draft: &ListingDraft, author: &str) -> Result<Product> {
        let fields = validation::listing(draft)?;
        load_user(&*self.users, author).await?;

        let product = Product {
            id: Uuid::now_v7(),
            title: fields.title,
            description: fields.description,
            image_url: fields.image_url,
            author: author.to_string(),
            price: fields.price,
            created_at: self.clock.now(),
            purchased_by: None,
            purchased_at: None,
            is_deleted: false,
            revision: 0,
        };
        match self.products.insert_product(product).await? {
            WriteOutcome::Applied(stored) => {
                tracing::info!(product_id = %stored.id, author, price = stored.price, "listing created");
                Ok(stored)
            }
            _ => Err(MarketError::Conflict),
        }
    }

    pub async fn update_listing(
        &self,
        product_id: Uuid,
        patch: &ListingPatch,
        actor: &str,
    ) -> Result<Product> {
        let current = load_product(&*self.products, product_id).await?;
        self.authorize(&current, actor).await?;
        if patch.is_empty() {
            return Err(MarketError::validation("patch", "no fields to update"));
        }

        let updated = update_product_with(&*self.products, product_id, |p| {
            if p.is_sold() || p.is_deleted {
                return Err(MarketError::forbidden(
                    "sold or deleted listings cannot be edited",
                ));
            }
            let fields = validation::patched_listing(p, patch)?;
            p.title = fields.title;
            p.description = fields.description;
            p.price = fields.price;
            p.image_url = fields.image_url;
            Ok(true)
        })
        .await?;
        tracing::info!(product_id = %product_id, actor, "listing updated");
        Ok(updated)
    }

    /// Irreversible. Repeating it is a no-op.
    pub async fn soft_delete_listing(&self, product_id: Uuid, actor: &str) -> Result<Product> {
        let current = load_product(&*self.products, product_id).await?;
        self.authorize(&current, actor).await?;

        let product = update_product_with(&*self.products, product_id, |p| {
            let changed = !p.is_deleted;
            p.is_deleted = true;
            Ok(changed)
        })
        .await?;
        tracing::info!(product_id = %product_id, actor, "listing deleted");
        Ok(product)
    }

    /// Author or acting admin. An unknown actor is simply not authorized.
    async fn authorize(&self, product: &Product, actor: &str) -> Result<User> {
        let now = self.clock.now();
        match self.users.get_user(actor).await? {
            Some(user) if product.author == actor || is_acting_admin(&user, now) => Ok(user),
            _ => Err(MarketError::forbidden(
                "only the seller or an administrator may change this listing",
            )),
        }
    }

    /// Direct lookup; deleted products are still returned.
    pub async fn get_product(&self, product_id: Uuid) -> Result<Product> {
        load_product(&*self.products, product_id).await
    }

    /// Visible listings, newest first.
    pub async fn list_listings(&self) -> Result<Vec<Product>> {
        let mut products = self.products.list_products(&ProductFilter::listed()).await?;
        products.reverse();
        Ok(products)
    }

    /// Everything `username` bought, including swept sales.
    pub async fn purchases_of(&self, username: &str) -> Result<Vec<Product>> {
        let filter = ProductFilter {
            include_deleted: true,
            purchased_by: Some(username.to_string()),
            ..Default::default()
        };
        Ok(self.products.list_products(&filter).await?)
    }

    /// Everything `username` sold, including swept sales.
    pub async fn sales_of(&self, username: &str) -> Result<Vec<Product>> {
        let filter = ProductFilter {
            include_deleted: true,
            author: Some(username.to_string()),
            sold: Some(true),
            ..Default::default()
        };
        Ok(self.products.list_products(&filter).await?)
    }
}
